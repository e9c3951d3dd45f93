//! Whole BUFR messages

use crate::{
    DescriptorChain, Error, Subset, TableResolver, decode_subsets, encode_subsets, expand,
    sections::{
        DataDescriptionSection, DataDescriptionSectionFlags, DataSection, HeaderSections,
        IdentificationSection, IdentificationSectionFlags, IndicatorSection, OptionalSection,
        ensure_end_section,
    },
};

/// A decoded BUFR message: header fields, the unexpanded descriptors of
/// section 3 and the subsets.
///
/// Section lengths and flags derived from the content are not stored; they
/// are recomputed by [`Bulletin::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bulletin {
    /// 3 or 4
    pub edition: u8,
    pub master_table_number: u8,
    pub centre: u16,
    pub sub_centre: u16,
    pub update_sequence_number: u8,
    pub data_category: u8,
    pub international_data_sub_category: u8,
    /// Not coded in edition 3
    pub local_data_sub_category: u8,
    pub master_table_version: u8,
    pub local_tables_version: u8,
    pub typical_year: u16,
    pub typical_month: u8,
    pub typical_day: u8,
    pub typical_hour: u8,
    pub typical_minute: u8,
    /// Not coded in edition 3
    pub typical_second: u8,
    /// Content of section 2, if present
    pub optional_section: Option<Vec<u8>>,
    pub is_observed_data: bool,
    pub descriptors: DescriptorChain,
    pub subsets: Vec<Subset>,
}

impl Default for Bulletin {
    fn default() -> Self {
        Self {
            edition: 4,
            master_table_number: 0,
            centre: 0,
            sub_centre: 0,
            update_sequence_number: 0,
            data_category: 0,
            international_data_sub_category: 0,
            local_data_sub_category: 0,
            master_table_version: 13,
            local_tables_version: 0,
            typical_year: 0,
            typical_month: 0,
            typical_day: 0,
            typical_hour: 0,
            typical_minute: 0,
            typical_second: 0,
            optional_section: None,
            is_observed_data: true,
            descriptors: DescriptorChain::new(),
            subsets: Vec::new(),
        }
    }
}

impl Bulletin {
    /// Decodes one complete message (`BUFR` to `7777`).
    pub fn decode<T: TableResolver + ?Sized>(bytes: &[u8], tables: &T) -> Result<Self, Error> {
        let mut reader = bytes;
        let header = HeaderSections::read(&mut reader)?;
        let edition = header.indicator_section.edition_number;
        let total_length = header.indicator_section.total_length as usize;
        if total_length > bytes.len() {
            return Err(Error::Truncated(format!(
                "message declares {total_length} bytes but only {} are available",
                bytes.len()
            )));
        }

        let dds = header.data_description_section;
        if dds.flags.is_compressed {
            return Err(Error::Consistency(
                "compressed data sections are not supported".to_string(),
            ));
        }
        let data_section = DataSection::read(&mut reader)?;
        ensure_end_section(edition, &mut reader)?;

        let descriptors = DescriptorChain::from(dds.descriptors);
        let chain = expand(&descriptors, tables)?;
        let subsets = decode_subsets(
            &chain,
            tables,
            &data_section.data,
            dds.number_of_subsets as usize,
        )?;
        tracing::debug!(
            target: "bufrex::codec",
            edition,
            centre = header.identification_section.centre,
            category = header.identification_section.data_category,
            subsets = subsets.len(),
            "decoded bulletin"
        );

        let id = header.identification_section;
        Ok(Self {
            edition,
            master_table_number: id.master_table_number,
            centre: id.centre,
            sub_centre: id.sub_centre,
            update_sequence_number: id.update_sequence_number,
            data_category: id.data_category,
            international_data_sub_category: id.international_data_sub_category,
            local_data_sub_category: id.local_data_sub_category,
            master_table_version: id.master_table_version,
            local_tables_version: id.local_tables_version,
            typical_year: id.typical_year,
            typical_month: id.typical_month,
            typical_day: id.typical_day,
            typical_hour: id.typical_hour,
            typical_minute: id.typical_minute,
            typical_second: id.typical_second,
            optional_section: header.optional_section.map(|s| s.optional),
            is_observed_data: dds.flags.is_observed_data,
            descriptors,
            subsets,
        })
    }

    /// Encodes the message, uncompressed.
    pub fn encode<T: TableResolver + ?Sized>(&self, tables: &T) -> Result<Vec<u8>, Error> {
        let chain = expand(&self.descriptors, tables)?;
        let data = encode_subsets(&chain, tables, &self.subsets)?;
        let Ok(number_of_subsets) = u16::try_from(self.subsets.len()) else {
            return Err(Error::Consistency(format!(
                "{} subsets do not fit in one message",
                self.subsets.len()
            )));
        };

        let header = HeaderSections {
            indicator_section: IndicatorSection {
                total_length: 0,
                edition_number: self.edition,
            },
            identification_section: self.identification_section(),
            optional_section: self.optional_section.clone().map(|optional| OptionalSection {
                section_length: 0,
                optional,
            }),
            data_description_section: DataDescriptionSection {
                section_length: 0,
                number_of_subsets,
                flags: DataDescriptionSectionFlags {
                    is_observed_data: self.is_observed_data,
                    is_compressed: false,
                },
                descriptors: self.descriptors.as_slice().to_vec(),
            },
        };

        let mut body = Vec::new();
        header.write_body(&mut body)?;
        DataSection::write(&data, &mut body)?;
        body.extend_from_slice(b"7777");

        let total_length = IndicatorSection::LEN + body.len();
        let mut out = Vec::new();
        out.try_reserve_exact(total_length)?;
        IndicatorSection {
            total_length: total_length as u32,
            edition_number: self.edition,
        }
        .write(&mut out)?;
        out.extend_from_slice(&body);

        tracing::debug!(
            target: "bufrex::codec",
            edition = self.edition,
            subsets = self.subsets.len(),
            bytes = out.len(),
            "encoded bulletin"
        );
        Ok(out)
    }

    fn identification_section(&self) -> IdentificationSection {
        IdentificationSection {
            section_length: 0,
            master_table_number: self.master_table_number,
            centre: self.centre,
            sub_centre: self.sub_centre,
            update_sequence_number: self.update_sequence_number,
            flags: IdentificationSectionFlags {
                has_optional_section: self.optional_section.is_some(),
            },
            data_category: self.data_category,
            international_data_sub_category: self.international_data_sub_category,
            local_data_sub_category: self.local_data_sub_category,
            master_table_version: self.master_table_version,
            local_tables_version: self.local_tables_version,
            typical_year: self.typical_year,
            typical_month: self.typical_month,
            typical_day: self.typical_day,
            typical_hour: self.typical_hour,
            typical_minute: self.typical_minute,
            typical_second: self.typical_second,
            local_use: Vec::new(),
        }
    }
}
