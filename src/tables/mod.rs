//! BUFR tables and the lookup contract the engine runs against

mod wmo;

pub use wmo::{WMO_TABLE_B, WMO_TABLE_D};

use hashbrown::HashMap;

use crate::{Descriptor, DescriptorChain, DescriptorKind, Error, XY};

/// Decoding metadata for one element descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo<'a> {
    pub code: Descriptor,
    pub name: &'a str,
    pub unit: &'a str,
    /// Decimal scale; the physical value is `(raw + reference) * 10^-scale`
    pub scale: i32,
    pub reference: i32,
    pub bit_width: u32,
    /// CCITT IA5 text, always a whole number of bytes
    pub is_string: bool,
}

impl VarInfo<'_> {
    /// Code and flag tables are not affected by the width/scale operators.
    pub fn is_code_or_flag(&self) -> bool {
        is_code_or_flag_unit(self.unit)
    }
}

pub(crate) fn is_string_unit(unit: &str) -> bool {
    unit.eq_ignore_ascii_case("CCITT IA5") || unit.eq_ignore_ascii_case("CCITTIA5")
}

fn is_code_or_flag_unit(unit: &str) -> bool {
    let unit = unit.to_ascii_lowercase();
    unit.starts_with("code table")
        || unit.starts_with("flag table")
        || unit.starts_with("code-table")
        || unit.starts_with("flag-table")
}

/// Lookup service the engine resolves descriptors through.
///
/// Implementations are read-only once loaded and can be shared between
/// threads decoding different messages.
pub trait TableResolver {
    /// Metadata for an element (f = 0) descriptor.
    fn resolve(&self, code: Descriptor) -> Result<VarInfo<'_>, Error>;

    /// One-level expansion of a sequence (f = 3) descriptor. The result may
    /// itself contain further sequences.
    fn expand_sequence(&self, code: Descriptor) -> Result<DescriptorChain, Error>;

    /// Repeat count of a replication (f = 1) descriptor, and whether the count
    /// is delayed (read from the data stream instead).
    fn base_repeat_count(&self, code: Descriptor) -> Result<(u8, bool), Error> {
        if code.kind() != DescriptorKind::Replication {
            return Err(Error::Consistency(format!(
                "{code} is not a replication descriptor"
            )));
        }
        Ok((code.y, code.y == 0))
    }
}

/// Collection of BUFR tables (B, D).
pub struct Tables {
    pub table_b: HashMap<XY, &'static TableBEntry>,
    pub table_d: HashMap<XY, &'static TableDEntry>,
}

impl Default for Tables {
    fn default() -> Self {
        Self::wmo()
    }
}

impl Tables {
    /// Tables with no entries at all.
    pub fn empty() -> Self {
        Self {
            table_b: HashMap::new(),
            table_d: HashMap::new(),
        }
    }

    /// Tables preloaded with the built-in subset of the WMO master tables.
    pub fn wmo() -> Self {
        let mut tables = Self::empty();
        for entry in &WMO_TABLE_B {
            tables.insert_b(entry);
        }
        for entry in &WMO_TABLE_D {
            tables.insert_d(entry);
        }
        tables
    }

    /// Adds or replaces a Table B entry, e.g. a local descriptor.
    pub fn insert_b(&mut self, entry: &'static TableBEntry) {
        self.table_b.insert(entry.xy, entry);
    }

    /// Adds or replaces a Table D entry.
    pub fn insert_d(&mut self, entry: &'static TableDEntry) {
        self.table_d.insert(entry.xy, entry);
    }
}

impl TableResolver for Tables {
    fn resolve(&self, code: Descriptor) -> Result<VarInfo<'_>, Error> {
        if code.kind() != DescriptorKind::Element {
            return Err(Error::Consistency(format!(
                "{code} is not an element descriptor"
            )));
        }
        let Some(b) = self.table_b.get(&code.xy()) else {
            return Err(Error::NotFound(format!(
                "Table B entry not found for {code}"
            )));
        };
        Ok(b.var_info())
    }

    fn expand_sequence(&self, code: Descriptor) -> Result<DescriptorChain, Error> {
        if code.kind() != DescriptorKind::Sequence {
            return Err(Error::Consistency(format!(
                "{code} is not a sequence descriptor"
            )));
        }
        let Some(d) = self.table_d.get(&code.xy()) else {
            return Err(Error::NotFound(format!(
                "Table D entry not found for {code}"
            )));
        };
        Ok(DescriptorChain::from(d.elements))
    }
}

/// Entry in Table B (element descriptors).
#[derive(Debug)]
pub struct TableBEntry {
    pub xy: XY,
    pub class_name: &'static str,
    pub element_name: &'static str,
    pub unit: &'static str,
    pub scale: i8,
    pub reference_value: i32,
    pub bits: u16,
}

impl TableBEntry {
    pub fn var_info(&self) -> VarInfo<'static> {
        VarInfo {
            code: Descriptor::b(self.xy.x, self.xy.y),
            name: self.element_name,
            unit: self.unit,
            scale: self.scale as i32,
            reference: self.reference_value,
            bit_width: self.bits as u32,
            is_string: is_string_unit(self.unit),
        }
    }
}

/// Entry in Table D (sequence descriptors).
#[derive(Debug)]
pub struct TableDEntry {
    pub xy: XY,
    pub category: &'static str,
    pub title: &'static str,
    pub elements: &'static [Descriptor],
}
