//! Table C operators and the modifier state they leave behind

use hashbrown::HashMap;

use crate::{Descriptor, Error, VarInfo, bitmap::BitmapOperator, bitmap::BitmapState};

/// A parsed operator descriptor (f = 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    /// 2 01 YYY
    ChangeWidth(i32),
    /// 2 02 YYY
    ChangeScale(i32),
    /// 2 03 YYY, YYY in 1..=254: start defining new reference values of YYY bits
    DefineReferences(u32),
    /// 2 03 255
    EndReferenceDefinition,
    /// 2 03 000
    CancelReferences,
    /// 2 04 YYY
    AssociatedField(u32),
    /// 2 05 YYY
    CharacterInsert(u32),
    /// 2 06 YYY
    LocalWidth(u32),
    /// 2 07 YYY
    IncreaseScaleReferenceWidth(i32),
    /// 2 08 YYY
    StringWidth(u32),
    /// 2 21 YYY
    DataNotPresent(u32),
    /// 2 22/23/24/25/32 000
    Bitmap(BitmapOperator),
    /// 2 23/24/25/32 255
    Marker(BitmapOperator),
    /// 2 35 000
    CancelBackReference,
    /// 2 36 000
    DefineBitmap,
    /// 2 37 000
    UseDefinedBitmap,
    /// 2 37 255
    CancelDefinedBitmap,
}

impl Operator {
    pub(crate) fn parse(d: Descriptor) -> Result<Self, Error> {
        if let Some(kind) = BitmapOperator::from_x(d.x) {
            match d.y {
                0 => return Ok(Operator::Bitmap(kind)),
                255 if kind != BitmapOperator::Quality => return Ok(Operator::Marker(kind)),
                _ => {}
            }
        }
        let y = d.y as u32;
        Ok(match (d.x, d.y) {
            (1, 0) => Operator::ChangeWidth(0),
            (1, _) => Operator::ChangeWidth(y as i32 - 128),
            (2, 0) => Operator::ChangeScale(0),
            (2, _) => Operator::ChangeScale(y as i32 - 128),
            (3, 0) => Operator::CancelReferences,
            (3, 255) => Operator::EndReferenceDefinition,
            (3, _) => Operator::DefineReferences(y),
            (4, _) => Operator::AssociatedField(y),
            (5, _) => Operator::CharacterInsert(y),
            (6, _) => Operator::LocalWidth(y),
            (7, _) => Operator::IncreaseScaleReferenceWidth(y as i32),
            (8, _) => Operator::StringWidth(y),
            (21, _) => Operator::DataNotPresent(y),
            (35, 0) => Operator::CancelBackReference,
            (36, 0) => Operator::DefineBitmap,
            (37, 0) => Operator::UseDefinedBitmap,
            (37, 255) => Operator::CancelDefinedBitmap,
            _ => {
                return Err(Error::NotFound(format!("Operator {d} is not supported")));
            }
        })
    }
}

/// Effective coding parameters of one element, after operators are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field {
    pub code: Descriptor,
    /// Bits, a multiple of 8 for strings
    pub width: u32,
    pub scale: i32,
    pub reference: i64,
    pub is_string: bool,
}

impl Field {
    pub fn chars(&self) -> usize {
        (self.width / 8) as usize
    }
}

/// Modifiers established by operator descriptors during one subset walk.
///
/// A fresh state is created at the start of every subset: nothing here
/// carries over from one subset to the next.
#[derive(Debug, Default)]
pub struct OperatorState {
    /// Added to the width of every following numeric element (2 01)
    pub width_delta: i32,
    /// Added to the scale of every following numeric element (2 02)
    pub scale_delta: i32,
    /// Replacement reference values, consumed by the matching element (2 03)
    pub new_reference_values: HashMap<Descriptor, i64>,
    /// Width of the reference values being defined, while a 2 03 run is open
    pub reference_definition: Option<u32>,
    /// Width of the associated field in front of each value, 0 if none (2 04)
    pub association_field_width: u32,
    /// Width of the next element only (2 06)
    pub local_width: Option<u32>,
    /// Scale increase, with matching reference and width changes (2 07)
    pub scale_increase: i32,
    /// Character count override for text elements (2 08)
    pub string_width: Option<u32>,
    /// Descriptors left in a data-not-present run (2 21)
    pub data_not_present: u32,
    pub(crate) bitmap: BitmapState,
}

impl OperatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a data-present bitmap is being read or written.
    pub fn bitmap_mode(&self) -> bool {
        self.bitmap.is_building()
    }

    /// Applies operators that only change state. Returns `false` for the
    /// ones the codec has to act on itself.
    pub(crate) fn apply(&mut self, op: Operator) -> bool {
        match op {
            Operator::ChangeWidth(delta) => self.width_delta = delta,
            Operator::ChangeScale(delta) => self.scale_delta = delta,
            Operator::DefineReferences(bits) => self.reference_definition = Some(bits),
            Operator::EndReferenceDefinition => self.reference_definition = None,
            Operator::CancelReferences => {
                self.reference_definition = None;
                self.new_reference_values.clear();
            }
            Operator::AssociatedField(width) => self.association_field_width = width,
            Operator::LocalWidth(width) => self.local_width = Some(width),
            Operator::IncreaseScaleReferenceWidth(y) => self.scale_increase = y,
            Operator::StringWidth(0) => self.string_width = None,
            Operator::StringWidth(chars) => self.string_width = Some(chars),
            Operator::DataNotPresent(count) => self.data_not_present = count,
            _ => return false,
        }
        true
    }

    pub(crate) fn define_reference(&mut self, code: Descriptor, reference: i64) {
        self.new_reference_values.insert(code, reference);
    }

    /// Counts one element against an open data-not-present run. Returns
    /// `true` when the element carries no data. Classes 1 to 9 and 31 keep
    /// their data inside the run.
    pub(crate) fn skip_data(&mut self, code: Descriptor) -> bool {
        if self.data_not_present == 0 {
            return false;
        }
        self.data_not_present -= 1;
        !matches!(code.x, 1..=9 | 31)
    }

    /// Width of the associated field to code in front of `code`.
    pub(crate) fn associated_width(&self, code: Descriptor) -> u32 {
        if code.is_data_description_operator_qualifier() {
            0
        } else {
            self.association_field_width
        }
    }

    /// Effective parameters of an element under the current modifiers.
    ///
    /// Consumes a pending 2 03 override for this element and the 2 06 width.
    pub(crate) fn field(&mut self, info: &VarInfo<'_>, local_width: Option<u32>) -> Result<Field, Error> {
        let mut width = info.bit_width as i64;
        let mut scale = info.scale;
        let mut reference = info.reference as i64;

        if info.is_string {
            if let Some(chars) = self.string_width {
                width = chars as i64 * 8;
            }
        } else if !info.is_code_or_flag() && !info.code.is_data_description_operator_qualifier() {
            width += self.width_delta as i64;
            scale += self.scale_delta;
            if self.scale_increase != 0 {
                let increase = self.scale_increase;
                scale += increase;
                reference = 10i64
                    .checked_pow(increase as u32)
                    .and_then(|p| reference.checked_mul(p))
                    .ok_or_else(|| {
                        Error::Consistency(format!(
                            "reference of {} overflows after 2 07 {increase:03}",
                            info.code
                        ))
                    })?;
                width += ((10 * increase + 2) / 3) as i64;
            }
        }

        if let Some(local) = local_width {
            width = local as i64;
        }
        if let Some(r) = self.new_reference_values.remove(&info.code) {
            reference = r;
        }

        let valid = if info.is_string {
            width >= 0 && width % 8 == 0
        } else {
            (0..=64).contains(&width)
        };
        if !valid {
            return Err(Error::Consistency(format!(
                "{} has an effective width of {width} bits",
                info.code
            )));
        }

        Ok(Field {
            code: info.code,
            width: width as u32,
            scale,
            reference,
            is_string: info.is_string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TableResolver, Tables};

    fn info(tables: &Tables, x: u8, y: u8) -> VarInfo<'_> {
        tables.resolve(Descriptor::b(x, y)).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Operator::parse(Descriptor::c(1, 129)).unwrap(),
            Operator::ChangeWidth(1)
        );
        assert_eq!(
            Operator::parse(Descriptor::c(2, 126)).unwrap(),
            Operator::ChangeScale(-2)
        );
        assert_eq!(
            Operator::parse(Descriptor::c(23, 255)).unwrap(),
            Operator::Marker(BitmapOperator::Substituted)
        );
        assert_eq!(
            Operator::parse(Descriptor::c(22, 0)).unwrap(),
            Operator::Bitmap(BitmapOperator::Quality)
        );
        assert!(matches!(
            Operator::parse(Descriptor::c(22, 255)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            Operator::parse(Descriptor::c(41, 0)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_width_and_scale_deltas() {
        let tables = Tables::wmo();
        let mut state = OperatorState::new();
        state.apply(Operator::parse(Descriptor::c(1, 130)).unwrap());
        state.apply(Operator::parse(Descriptor::c(2, 129)).unwrap());

        let f = state.field(&info(&tables, 12, 101), None).unwrap();
        assert_eq!((f.width, f.scale), (18, 3));

        // Code tables and class 31 are not affected
        let f = state.field(&info(&tables, 8, 23), None).unwrap();
        assert_eq!((f.width, f.scale), (6, 0));
        let f = state.field(&info(&tables, 31, 1), None).unwrap();
        assert_eq!(f.width, 8);

        state.apply(Operator::parse(Descriptor::c(1, 0)).unwrap());
        let f = state.field(&info(&tables, 12, 101), None).unwrap();
        assert_eq!((f.width, f.scale), (16, 3));
    }

    #[test]
    fn test_scale_increase() {
        let tables = Tables::wmo();
        let mut state = OperatorState::new();
        state.apply(Operator::IncreaseScaleReferenceWidth(2));
        let f = state.field(&info(&tables, 7, 1), None).unwrap();
        assert_eq!(f.scale, 2);
        assert_eq!(f.reference, -40000);
        assert_eq!(f.width, 15 + 7);
    }

    #[test]
    fn test_reference_override_is_consumed_once() {
        let tables = Tables::wmo();
        let mut state = OperatorState::new();
        state.define_reference(Descriptor::b(12, 101), -5000);
        let f = state.field(&info(&tables, 12, 101), None).unwrap();
        assert_eq!(f.reference, -5000);
        let f = state.field(&info(&tables, 12, 101), None).unwrap();
        assert_eq!(f.reference, 0);
    }

    #[test]
    fn test_string_width_and_local_width() {
        let tables = Tables::wmo();
        let mut state = OperatorState::new();
        let f = state.field(&info(&tables, 1, 15), None).unwrap();
        assert_eq!((f.width, f.chars()), (160, 20));

        state.apply(Operator::StringWidth(4));
        let f = state.field(&info(&tables, 1, 19), None).unwrap();
        assert_eq!(f.chars(), 4);

        let f = state.field(&info(&tables, 13, 3), Some(11)).unwrap();
        assert_eq!(f.width, 11);
    }

    #[test]
    fn test_data_not_present() {
        let mut state = OperatorState::new();
        state.apply(Operator::DataNotPresent(3));
        assert!(state.skip_data(Descriptor::b(12, 101)));
        assert!(!state.skip_data(Descriptor::b(4, 4)));
        assert!(state.skip_data(Descriptor::b(13, 3)));
        assert!(!state.skip_data(Descriptor::b(13, 3)));
    }

    #[test]
    fn test_negative_width_is_rejected() {
        let tables = Tables::wmo();
        let mut state = OperatorState::new();
        state.apply(Operator::ChangeWidth(-100));
        assert!(matches!(
            state.field(&info(&tables, 12, 101), None),
            Err(Error::Consistency(_))
        ));
    }
}
