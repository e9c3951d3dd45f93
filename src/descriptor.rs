//! Descriptors (FXY)

use std::fmt::{Debug, Display};
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::Error;

/// Descriptor (FXY)
///
/// Ordering follows the packed 16-bit code, since `f` is the most significant
/// field and `y` the least.
#[derive(Hash, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Descriptor {
    pub f: u8,
    pub x: u8,
    pub y: u8,
}

/// What a descriptor stands for, from its `f` field.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DescriptorKind {
    /// Table B element (f = 0)
    Element,
    /// Replication (f = 1)
    Replication,
    /// Table C operator (f = 2)
    Operator,
    /// Table D sequence (f = 3)
    Sequence,
}

impl Descriptor {
    pub const fn new(f: u8, x: u8, y: u8) -> Self {
        Descriptor { f, x, y }
    }

    /// Element descriptor `0 XX YYY`
    pub const fn b(x: u8, y: u8) -> Self {
        Self::new(0, x, y)
    }

    /// Replication descriptor `1 XX YYY`
    pub const fn r(x: u8, y: u8) -> Self {
        Self::new(1, x, y)
    }

    /// Operator descriptor `2 XX YYY`
    pub const fn c(x: u8, y: u8) -> Self {
        Self::new(2, x, y)
    }

    /// Sequence descriptor `3 XX YYY`
    pub const fn d(x: u8, y: u8) -> Self {
        Self::new(3, x, y)
    }

    pub const fn from_code(code: u16) -> Self {
        Descriptor {
            f: (code >> 14) as u8,
            x: ((code >> 8) & 0x3f) as u8,
            y: (code & 0xff) as u8,
        }
    }

    /// The packed 16-bit code as it appears in section 3.
    pub const fn code(&self) -> u16 {
        ((self.f as u16 & 0x3) << 14) | ((self.x as u16 & 0x3f) << 8) | self.y as u16
    }

    pub fn kind(&self) -> DescriptorKind {
        match self.f & 0x3 {
            0 => DescriptorKind::Element,
            1 => DescriptorKind::Replication,
            2 => DescriptorKind::Operator,
            _ => DescriptorKind::Sequence,
        }
    }

    pub fn xy(&self) -> XY {
        XY {
            x: self.x,
            y: self.y,
        }
    }

    /// Class 31 elements: replication factors and bitmap entries.
    pub fn is_data_description_operator_qualifier(&self) -> bool {
        self.f == 0 && self.x == 31
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let val = reader.read_u16::<BigEndian>()?;
        Ok(Descriptor::from_code(val))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_u16::<BigEndian>(self.code())?;
        Ok(())
    }
}

impl From<u16> for Descriptor {
    fn from(code: u16) -> Self {
        Descriptor::from_code(code)
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Descriptor {0:1}{1:02}{2:03}", self.f, self.x, self.y)
    }
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self.kind() {
            DescriptorKind::Element => 'B',
            DescriptorKind::Replication => 'R',
            DescriptorKind::Operator => 'C',
            DescriptorKind::Sequence => 'D',
        };
        write!(f, "{letter}{0:02}{1:03}", self.x, self.y)
    }
}

#[derive(Hash, Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct XY {
    pub x: u8,
    pub y: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_packing() {
        let d = Descriptor::new(3, 1, 21);
        assert_eq!(d.code(), 0xc115);
        assert_eq!(Descriptor::from_code(0xc115), d);
        assert_eq!(d.kind(), DescriptorKind::Sequence);
        assert_eq!(Descriptor::from_code(Descriptor::b(63, 255).code()), Descriptor::b(63, 255));
    }

    #[test]
    fn test_ordering_follows_code() {
        let mut v = vec![
            Descriptor::d(1, 11),
            Descriptor::b(12, 101),
            Descriptor::r(1, 0),
            Descriptor::b(1, 2),
            Descriptor::c(1, 129),
        ];
        v.sort();
        let codes: Vec<u16> = v.iter().map(|d| d.code()).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
        assert_eq!(v[0], Descriptor::b(1, 2));
    }

    #[test]
    fn test_fmt() {
        assert_eq!(format!("{}", Descriptor::b(1, 2)), "B01002");
        assert_eq!(format!("{}", Descriptor::r(2, 0)), "R02000");
        assert_eq!(format!("{:?}", Descriptor::c(22, 0)), "Descriptor 222000");
    }

    #[test]
    fn test_read_write() {
        let mut buf = vec![];
        Descriptor::d(7, 11).write(&mut buf).unwrap();
        assert_eq!(buf.len(), 2);
        let d = Descriptor::read(&mut buf.as_slice()).unwrap();
        assert_eq!(d, Descriptor::d(7, 11));
    }
}
