//! The framing sections of a BUFR message

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::{Descriptor, Error};

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_length<W: Write>(writer: &mut W, len: usize) -> Result<(), Error> {
    if len > 0xff_ffff {
        return Err(Error::Consistency(format!(
            "section of {len} bytes does not fit a 3-byte length"
        )));
    }
    writer.write_u24::<BigEndian>(len as u32)?;
    Ok(())
}

/// Edition 3 requires every section to have an even length.
fn padded_len(edition: u8, len: usize) -> usize {
    if edition == 3 && len % 2 == 1 {
        len + 1
    } else {
        len
    }
}

/// The sections in front of the data section
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderSections {
    pub indicator_section: IndicatorSection,
    pub identification_section: IdentificationSection,
    pub optional_section: Option<OptionalSection>,
    pub data_description_section: DataDescriptionSection,
}

impl HeaderSections {
    pub fn read<R: Read>(mut reader: R) -> Result<Self, Error> {
        // Indicator section
        let indicator_section = IndicatorSection::read(&mut reader)?;

        // Identification section
        let identification_section = match indicator_section.edition_number {
            3 => IdentificationSectionV3::read(&mut reader)?.into(),
            4 => IdentificationSection::read(&mut reader)?,
            _ => {
                return Err(Error::Consistency(format!(
                    "Unsupported edition number {}",
                    indicator_section.edition_number
                )));
            }
        };

        // Optional section
        let optional_section = match identification_section.flags.has_optional_section {
            true => Some(OptionalSection::read(&mut reader)?),
            false => None,
        };

        // Data description section
        let data_description_section = DataDescriptionSection::read(&mut reader)?;

        Ok(HeaderSections {
            indicator_section,
            identification_section,
            optional_section,
            data_description_section,
        })
    }

    /// Writes sections 1 to 3 for the edition named in the indicator
    /// section. Section 0 needs the total length and is written separately.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let edition = self.indicator_section.edition_number;
        let mut identification = self.identification_section.clone();
        identification.flags.has_optional_section = self.optional_section.is_some();
        match edition {
            3 => IdentificationSectionV3::try_from(&identification)?.write(writer)?,
            4 => identification.write(writer)?,
            _ => {
                return Err(Error::Consistency(format!(
                    "Unsupported edition number {edition}"
                )));
            }
        }
        if let Some(optional) = &self.optional_section {
            optional.write(edition, writer)?;
        }
        self.data_description_section.write(edition, writer)
    }
}

/// Indicator section (Section 0)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IndicatorSection {
    pub total_length: u32,
    pub edition_number: u8,
}

impl IndicatorSection {
    pub const LEN: usize = 8;

    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != b"BUFR" {
            return Err(Error::Consistency("Invalid magic number".to_string()));
        }

        let total_length = reader.read_u24::<BigEndian>()?;
        let edition_number = reader.read_u8()?;

        Ok(Self {
            total_length,
            edition_number,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(b"BUFR")?;
        write_length(writer, self.total_length as usize)?;
        writer.write_u8(self.edition_number)?;
        Ok(())
    }
}

/// Identification section (Section 1)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IdentificationSection {
    pub section_length: u32,
    pub master_table_number: u8,
    pub centre: u16,
    pub sub_centre: u16,
    pub update_sequence_number: u8,
    pub flags: IdentificationSectionFlags,
    pub data_category: u8,
    pub international_data_sub_category: u8,
    pub local_data_sub_category: u8,
    pub master_table_version: u8,
    pub local_tables_version: u8,
    pub typical_year: u16,
    pub typical_month: u8,
    pub typical_day: u8,
    pub typical_hour: u8,
    pub typical_minute: u8,
    pub typical_second: u8,
    pub local_use: Vec<u8>,
}

impl IdentificationSection {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let section_length = reader.read_u24::<BigEndian>()?;

        if section_length < 22 {
            return Err(Error::Consistency(
                "Identification section (BUFR4) length must be >= 22".to_string(),
            ));
        }

        let master_table_number = reader.read_u8()?;
        let centre = reader.read_u16::<BigEndian>()?;
        let sub_centre = reader.read_u16::<BigEndian>()?;
        let update_sequence_number = reader.read_u8()?;
        let flags = IdentificationSectionFlags::read(reader)?;
        let data_category = reader.read_u8()?;
        let international_data_sub_category = reader.read_u8()?;
        let local_data_sub_category = reader.read_u8()?;
        let master_table_version = reader.read_u8()?;
        let local_tables_version = reader.read_u8()?;
        let typical_year = reader.read_u16::<BigEndian>()?;
        let typical_month = reader.read_u8()?;
        let typical_day = reader.read_u8()?;
        let typical_hour = reader.read_u8()?;
        let typical_minute = reader.read_u8()?;
        let typical_second = reader.read_u8()?;

        let local_use = read_bytes(reader, (section_length - 22) as usize)?;

        Ok(Self {
            section_length,
            master_table_number,
            centre,
            sub_centre,
            update_sequence_number,
            flags,
            data_category,
            international_data_sub_category,
            local_data_sub_category,
            master_table_version,
            local_tables_version,
            typical_year,
            typical_month,
            typical_day,
            typical_hour,
            typical_minute,
            typical_second,
            local_use,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        write_length(writer, 22 + self.local_use.len())?;
        writer.write_u8(self.master_table_number)?;
        writer.write_u16::<BigEndian>(self.centre)?;
        writer.write_u16::<BigEndian>(self.sub_centre)?;
        writer.write_u8(self.update_sequence_number)?;
        self.flags.write(writer)?;
        writer.write_u8(self.data_category)?;
        writer.write_u8(self.international_data_sub_category)?;
        writer.write_u8(self.local_data_sub_category)?;
        writer.write_u8(self.master_table_version)?;
        writer.write_u8(self.local_tables_version)?;
        writer.write_u16::<BigEndian>(self.typical_year)?;
        writer.write_u8(self.typical_month)?;
        writer.write_u8(self.typical_day)?;
        writer.write_u8(self.typical_hour)?;
        writer.write_u8(self.typical_minute)?;
        writer.write_u8(self.typical_second)?;
        writer.write_all(&self.local_use)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct IdentificationSectionV3 {
    pub section_length: u32,
    pub master_table_number: u8,
    pub sub_centre: u8,
    pub centre: u8,
    pub update_sequence_number: u8,
    pub flags: IdentificationSectionFlags,
    pub data_category: u8,
    pub data_sub_category: u8,
    pub master_table_version: u8,
    pub local_tables_version: u8,
    /// Year of the century
    pub typical_year: u8,
    pub typical_month: u8,
    pub typical_day: u8,
    pub typical_hour: u8,
    pub typical_minute: u8,
    pub local_use: Vec<u8>,
}

impl IdentificationSectionV3 {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let section_length = reader.read_u24::<BigEndian>()?;

        if section_length < 17 {
            return Err(Error::Consistency(
                "Identification section (BUFR3) length must be >= 17".to_string(),
            ));
        }

        let master_table_number = reader.read_u8()?;
        let sub_centre = reader.read_u8()?;
        let centre = reader.read_u8()?;
        let update_sequence_number = reader.read_u8()?;
        let flags = IdentificationSectionFlags::read(reader)?;
        let data_category = reader.read_u8()?;
        let data_sub_category = reader.read_u8()?;
        let master_table_version = reader.read_u8()?;
        let local_tables_version = reader.read_u8()?;
        let typical_year = reader.read_u8()?;
        let typical_month = reader.read_u8()?;
        let typical_day = reader.read_u8()?;
        let typical_hour = reader.read_u8()?;
        let typical_minute = reader.read_u8()?;

        let local_use = read_bytes(reader, (section_length - 17) as usize)?;

        Ok(Self {
            section_length,
            master_table_number,
            sub_centre,
            centre,
            update_sequence_number,
            flags,
            data_category,
            data_sub_category,
            master_table_version,
            local_tables_version,
            typical_year,
            typical_month,
            typical_day,
            typical_hour,
            typical_minute,
            local_use,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let len = 17 + self.local_use.len();
        let padded = padded_len(3, len);
        write_length(writer, padded)?;
        writer.write_u8(self.master_table_number)?;
        writer.write_u8(self.sub_centre)?;
        writer.write_u8(self.centre)?;
        writer.write_u8(self.update_sequence_number)?;
        self.flags.write(writer)?;
        writer.write_u8(self.data_category)?;
        writer.write_u8(self.data_sub_category)?;
        writer.write_u8(self.master_table_version)?;
        writer.write_u8(self.local_tables_version)?;
        writer.write_u8(self.typical_year)?;
        writer.write_u8(self.typical_month)?;
        writer.write_u8(self.typical_day)?;
        writer.write_u8(self.typical_hour)?;
        writer.write_u8(self.typical_minute)?;
        writer.write_all(&self.local_use)?;
        if padded > len {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

impl From<IdentificationSectionV3> for IdentificationSection {
    fn from(value: IdentificationSectionV3) -> Self {
        // Edition 3 only stores the year of the century
        let typical_year = match value.typical_year {
            y @ 51..=100 => 1900 + y as u16,
            y => 2000 + (y % 100) as u16,
        };
        Self {
            section_length: value.section_length,
            master_table_number: value.master_table_number,
            centre: value.centre as u16,
            sub_centre: value.sub_centre as u16,
            update_sequence_number: value.update_sequence_number,
            flags: value.flags,
            data_category: value.data_category,
            international_data_sub_category: value.data_sub_category,
            local_data_sub_category: 0,
            master_table_version: value.master_table_version,
            local_tables_version: value.local_tables_version,
            typical_year,
            typical_month: value.typical_month,
            typical_day: value.typical_day,
            typical_hour: value.typical_hour,
            typical_minute: value.typical_minute,
            typical_second: 0,
            local_use: value.local_use,
        }
    }
}

impl TryFrom<&IdentificationSection> for IdentificationSectionV3 {
    type Error = Error;

    fn try_from(value: &IdentificationSection) -> Result<Self, Error> {
        let narrow = |v: u16, what: &str| {
            u8::try_from(v).map_err(|_| {
                Error::Consistency(format!("{what} {v} does not fit an edition 3 header"))
            })
        };
        Ok(Self {
            section_length: value.section_length,
            master_table_number: value.master_table_number,
            sub_centre: narrow(value.sub_centre, "sub-centre")?,
            centre: narrow(value.centre, "centre")?,
            update_sequence_number: value.update_sequence_number,
            flags: value.flags.clone(),
            data_category: value.data_category,
            data_sub_category: value.international_data_sub_category,
            master_table_version: value.master_table_version,
            local_tables_version: value.local_tables_version,
            typical_year: match value.typical_year % 100 {
                // Year 2000 is coded as 100
                0 if value.typical_year >= 2000 => 100,
                y => y as u8,
            },
            typical_month: value.typical_month,
            typical_day: value.typical_day,
            typical_hour: value.typical_hour,
            typical_minute: value.typical_minute,
            local_use: value.local_use.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IdentificationSectionFlags {
    pub has_optional_section: bool,
}

impl IdentificationSectionFlags {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let flags = reader.read_u8()?;
        Ok(Self {
            has_optional_section: flags & 0b10000000 != 0,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let flags = if self.has_optional_section {
            0b10000000
        } else {
            0
        };
        writer.write_u8(flags)?;
        Ok(())
    }
}

/// Optional section (Section 2)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OptionalSection {
    pub section_length: u32,
    pub optional: Vec<u8>,
}

impl OptionalSection {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let section_length = reader.read_u24::<BigEndian>()?;

        // Skip reserved byte
        reader.read_u8()?;

        if section_length < 4 {
            return Err(Error::Consistency(
                "Optional section length must be >= 4".to_string(),
            ));
        }

        let optional = read_bytes(reader, (section_length - 4) as usize)?;

        Ok(Self {
            section_length,
            optional,
        })
    }

    fn write<W: Write>(&self, edition: u8, writer: &mut W) -> Result<(), Error> {
        let len = 4 + self.optional.len();
        let padded = padded_len(edition, len);
        write_length(writer, padded)?;
        writer.write_u8(0)?;
        writer.write_all(&self.optional)?;
        if padded > len {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

/// Data description section (Section 3)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataDescriptionSection {
    pub section_length: u32,
    pub number_of_subsets: u16,
    pub flags: DataDescriptionSectionFlags,
    pub descriptors: Vec<Descriptor>,
}

impl DataDescriptionSection {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let section_length = reader.read_u24::<BigEndian>()?;

        // Skip reserved byte
        reader.read_u8()?;

        if section_length < 7 {
            return Err(Error::Consistency(
                "Data description section length must be >= 7".to_string(),
            ));
        }

        let number_of_subsets = reader.read_u16::<BigEndian>()?;
        let flags = DataDescriptionSectionFlags::read(reader)?;

        let descriptor_count = ((section_length - 7) / 2) as usize;
        let mut descriptors = Vec::new();
        descriptors.try_reserve_exact(descriptor_count)?;

        for _ in 0..descriptor_count {
            descriptors.push(Descriptor::read(&mut *reader)?);
        }

        // Edition 3 pads to an even length
        let padding_len = section_length as usize - 7 - (2 * descriptors.len());
        read_bytes(reader, padding_len)?;

        Ok(Self {
            section_length,
            number_of_subsets,
            flags,
            descriptors,
        })
    }

    fn write<W: Write>(&self, edition: u8, writer: &mut W) -> Result<(), Error> {
        let len = 7 + 2 * self.descriptors.len();
        let padded = padded_len(edition, len);
        write_length(writer, padded)?;
        writer.write_u8(0)?;
        writer.write_u16::<BigEndian>(self.number_of_subsets)?;
        self.flags.write(writer)?;
        for desc in &self.descriptors {
            desc.write(&mut *writer)?;
        }
        if padded > len {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataDescriptionSectionFlags {
    pub is_observed_data: bool,
    pub is_compressed: bool,
}

impl DataDescriptionSectionFlags {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let flags = reader.read_u8()?;
        Ok(Self {
            is_observed_data: flags & 0b10000000 != 0,
            is_compressed: flags & 0b01000000 != 0,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let mut flags = 0u8;
        if self.is_observed_data {
            flags |= 0b10000000;
        }
        if self.is_compressed {
            flags |= 0b01000000;
        }
        writer.write_u8(flags)?;
        Ok(())
    }
}

/// Data section (Section 4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSection {
    pub section_length: u32,
    /// Bit-packed subsets, including any padding at the end
    pub data: Vec<u8>,
}

impl DataSection {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let section_length = reader.read_u24::<BigEndian>()?;

        // Skip reserved byte
        reader.read_u8()?;

        if section_length < 4 {
            return Err(Error::Consistency(
                "Data section length must be >= 4".to_string(),
            ));
        }

        let data = read_bytes(reader, (section_length - 4) as usize)?;

        Ok(Self {
            section_length,
            data,
        })
    }

    /// Writes the section, padded to an even length.
    pub fn write<W: Write>(data: &[u8], writer: &mut W) -> Result<(), Error> {
        let len = 4 + data.len();
        let padded = len + len % 2;
        write_length(writer, padded)?;
        writer.write_u8(0)?;
        writer.write_all(data)?;
        if padded > len {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

/// Check if the end section appears in the stream
pub fn ensure_end_section<R: Read>(edition: u8, reader: &mut R) -> Result<(), Error> {
    if edition == 3 {
        // Some edition 3 encoders leave a stray zero byte before the end section
        let mut buf: [u8; 1] = [0; 1];
        reader.read_exact(&mut buf)?;
        match buf[0] {
            0x0 => {}
            b'7' => {
                let mut buf: [u8; 3] = [0; 3];
                reader.read_exact(&mut buf)?;
                if &buf != b"777" {
                    return Err(Error::Consistency("Invalid end section".to_string()));
                }
                return Ok(());
            }
            _ => {
                return Err(Error::Consistency("Invalid end section".to_string()));
            }
        }
    }
    let mut buf: [u8; 4] = [0; 4];
    reader.read_exact(&mut buf)?;
    if &buf != b"7777" {
        return Err(Error::Consistency("Invalid end section".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification() -> IdentificationSection {
        IdentificationSection {
            section_length: 22,
            master_table_number: 0,
            centre: 98,
            sub_centre: 0,
            update_sequence_number: 0,
            flags: IdentificationSectionFlags::default(),
            data_category: 0,
            international_data_sub_category: 1,
            local_data_sub_category: 0,
            master_table_version: 13,
            local_tables_version: 0,
            typical_year: 2024,
            typical_month: 5,
            typical_day: 17,
            typical_hour: 12,
            typical_minute: 0,
            typical_second: 0,
            local_use: Vec::new(),
        }
    }

    fn header(edition: u8) -> HeaderSections {
        HeaderSections {
            indicator_section: IndicatorSection {
                total_length: 0,
                edition_number: edition,
            },
            identification_section: identification(),
            optional_section: Some(OptionalSection {
                section_length: 0,
                optional: vec![1, 2, 3],
            }),
            data_description_section: DataDescriptionSection {
                section_length: 0,
                number_of_subsets: 2,
                flags: DataDescriptionSectionFlags {
                    is_observed_data: true,
                    is_compressed: false,
                },
                descriptors: vec![Descriptor::d(1, 1), Descriptor::b(12, 101)],
            },
        }
    }

    fn reread(header: &HeaderSections) -> (Vec<u8>, HeaderSections) {
        let mut buf = Vec::new();
        header.indicator_section.write(&mut buf).unwrap();
        header.write_body(&mut buf).unwrap();
        let parsed = HeaderSections::read(&buf[..]).unwrap();
        (buf, parsed)
    }

    #[test]
    fn test_edition_4_header() {
        let (buf, parsed) = reread(&header(4));
        // 8 + 22 + 7 + 11
        assert_eq!(buf.len(), 48);
        assert_eq!(parsed.identification_section.centre, 98);
        assert_eq!(parsed.identification_section.typical_year, 2024);
        assert!(parsed.identification_section.flags.has_optional_section);
        assert_eq!(parsed.optional_section.unwrap().optional, [1, 2, 3]);
        assert_eq!(parsed.data_description_section.section_length, 11);
        assert_eq!(
            parsed.data_description_section.descriptors,
            [Descriptor::d(1, 1), Descriptor::b(12, 101)]
        );
    }

    #[test]
    fn test_edition_3_header_is_even() {
        let (buf, parsed) = reread(&header(3));
        // 8 + 18 + 8 + 12
        assert_eq!(buf.len(), 46);
        assert_eq!(parsed.identification_section.typical_year, 2024);
        assert_eq!(parsed.identification_section.section_length, 18);
        assert_eq!(parsed.data_description_section.section_length, 12);
        assert_eq!(parsed.data_description_section.descriptors.len(), 2);
    }

    #[test]
    fn test_edition_3_rejects_wide_centre() {
        let mut h = header(3);
        h.identification_section.centre = 300;
        assert!(matches!(
            h.write_body(&mut Vec::new()),
            Err(Error::Consistency(_))
        ));
    }

    #[test]
    fn test_bad_magic_and_edition() {
        assert!(matches!(
            HeaderSections::read(&b"GRIB\0\0\0\x04"[..]),
            Err(Error::Consistency(_))
        ));
        assert!(matches!(
            HeaderSections::read(&b"BUFR\0\0\0\x02"[..]),
            Err(Error::Consistency(_))
        ));
        assert!(matches!(
            HeaderSections::read(&b"BUFR\0\0"[..]),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn test_data_section_padding() {
        let mut buf = Vec::new();
        DataSection::write(&[0xab, 0xcd, 0xef], &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 8, 0, 0xab, 0xcd, 0xef, 0]);
        let section = DataSection::read(&mut &buf[..]).unwrap();
        assert_eq!(section.data, [0xab, 0xcd, 0xef, 0]);
    }

    #[test]
    fn test_end_section() {
        assert!(ensure_end_section(4, &mut &b"7777"[..]).is_ok());
        assert!(ensure_end_section(3, &mut &b"7777"[..]).is_ok());
        assert!(ensure_end_section(3, &mut &b"\x007777"[..]).is_ok());
        assert!(ensure_end_section(4, &mut &b"7778"[..]).is_err());
    }
}
