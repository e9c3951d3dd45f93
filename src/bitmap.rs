//! Data-present bitmaps and the attributes they associate with earlier values
//!
//! A bitmap operator (2 22..2 25, 2 32 with YYY = 000) is followed by a run
//! of 031031 entries. Entry `j` of an `N` entry bitmap refers to the `j`-th
//! of the last `N` eligible variables emitted before the operator, and a zero
//! bit marks that variable as having data present. The values that follow
//! (class 33 elements, or 255 markers) are then attached, in bitmap order, to
//! the variables marked present. Class 33 values are attached under their own
//! code, marker values under the marker descriptor (2 23 255 etc.), so each
//! kind of attribute has its own key on the variable.

use crate::{Descriptor, Error, Variable};

/// The 031031 data present indicator.
pub(crate) const DATA_PRESENT_INDICATOR: Descriptor = Descriptor::b(31, 31);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitmapOperator {
    /// 2 22: quality information, carried by class 33 elements
    Quality,
    /// 2 23: substituted values
    Substituted,
    /// 2 24: first-order statistical values
    FirstOrderStatistics,
    /// 2 25: difference statistical values
    DifferenceStatistics,
    /// 2 32: replaced/retained values
    Replaced,
}

impl BitmapOperator {
    pub(crate) fn from_x(x: u8) -> Option<Self> {
        match x {
            22 => Some(Self::Quality),
            23 => Some(Self::Substituted),
            24 => Some(Self::FirstOrderStatistics),
            25 => Some(Self::DifferenceStatistics),
            32 => Some(Self::Replaced),
            _ => None,
        }
    }

    /// The 2 YY 255 descriptor standing for one value of this operator.
    /// Marker values are attached to their target under this code.
    pub(crate) fn marker(&self) -> Descriptor {
        let x = match self {
            Self::Quality => 22,
            Self::Substituted => 23,
            Self::FirstOrderStatistics => 24,
            Self::DifferenceStatistics => 25,
            Self::Replaced => 32,
        };
        Descriptor::c(x, 255)
    }

    /// Whether a bitmap written for this operator marks `var` as present.
    ///
    /// Quality bitmaps select variables carrying an attribute with one of
    /// `quality_codes`, the class 33 elements that follow the bitmap. The
    /// others select variables carrying a value for their marker.
    pub(crate) fn selects(&self, var: &Variable, quality_codes: &[Descriptor]) -> bool {
        match self {
            Self::Quality => var
                .attributes
                .iter()
                .any(|a| quality_codes.contains(&a.code)),
            _ => var.attribute(self.marker()).is_some(),
        }
    }
}

/// Variables a completed bitmap selected, as indices into the subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Bitmap {
    targets: Vec<usize>,
}

/// Bitmap bookkeeping for one subset walk.
#[derive(Debug, Default)]
pub(crate) struct BitmapState {
    operator: Option<BitmapOperator>,
    /// Eligible variables emitted when the operator was met
    anchor: usize,
    /// Entries read so far, `true` for data present
    entries: Option<Vec<bool>>,
    define_next: bool,
    reusable: Option<Bitmap>,
    active: Option<Bitmap>,
    cursor: usize,
}

impl BitmapState {
    pub(crate) fn operator(&self) -> Option<BitmapOperator> {
        self.operator
    }

    pub(crate) fn is_building(&self) -> bool {
        self.entries.is_some()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Opens a new bitmap for `op`. `anchor` is the number of eligible
    /// variables emitted so far.
    pub(crate) fn start(&mut self, op: BitmapOperator, anchor: usize) {
        self.operator = Some(op);
        self.anchor = anchor;
        self.entries = Some(Vec::new());
        self.active = None;
        self.cursor = 0;
    }

    /// Number of entries collected in the open bitmap.
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn push_entry(&mut self, present: bool) {
        if let Some(entries) = self.entries.as_mut() {
            entries.push(present);
        }
    }

    /// Closes the open bitmap, resolving its entries against `eligible`.
    pub(crate) fn finish(&mut self, eligible: &[usize]) -> Result<(), Error> {
        let Some(entries) = self.entries.take() else {
            return Ok(());
        };
        let first = candidates_start(self.anchor, entries.len())?;
        let targets = entries
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(|(j, _)| eligible[first + j])
            .collect();
        let bitmap = Bitmap { targets };
        tracing::trace!(
            target: "bufrex::codec",
            entries = entries.len(),
            selected = bitmap.targets.len(),
            "bitmap complete"
        );
        if self.define_next {
            self.define_next = false;
            self.reusable = Some(bitmap.clone());
        }
        self.active = Some(bitmap);
        self.cursor = 0;
        Ok(())
    }

    /// 2 36 000: the next completed bitmap is kept for reuse.
    pub(crate) fn define_for_reuse(&mut self) {
        self.define_next = true;
    }

    /// 2 37 000: the kept bitmap replaces the one being opened.
    pub(crate) fn reuse(&mut self) -> Result<(), Error> {
        let Some(bitmap) = self.reusable.clone() else {
            return Err(Error::Consistency(
                "2 37 000 without a bitmap defined by 2 36 000".to_string(),
            ));
        };
        self.entries = None;
        self.active = Some(bitmap);
        self.cursor = 0;
        Ok(())
    }

    /// 2 37 255
    pub(crate) fn cancel_reuse(&mut self) {
        self.reusable = None;
        self.define_next = false;
    }

    /// 2 35 000: forgets every bitmap and back reference.
    pub(crate) fn cancel(&mut self) {
        *self = Self::default();
    }

    /// Next variable an attribute attaches to, cycling over the selection.
    pub(crate) fn next_target(&mut self) -> Result<usize, Error> {
        let Some(bitmap) = self.active.as_ref() else {
            return Err(Error::Consistency(
                "attribute value without a preceding bitmap".to_string(),
            ));
        };
        if bitmap.targets.is_empty() {
            return Err(Error::Consistency(
                "attribute value but the bitmap selects no variables".to_string(),
            ));
        }
        let target = bitmap.targets[self.cursor % bitmap.targets.len()];
        self.cursor += 1;
        Ok(target)
    }
}

/// Index into the eligible list of the first variable a bitmap of `len`
/// entries refers to.
pub(crate) fn candidates_start(anchor: usize, len: usize) -> Result<usize, Error> {
    anchor.checked_sub(len).ok_or_else(|| {
        Error::Consistency(format!(
            "bitmap of {len} entries refers back past the {anchor} values before it"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn test_targets_are_the_last_n_variables() {
        // Variables 0..5 are eligible, the bitmap covers the last three
        let eligible = [0, 1, 3, 4, 6];
        let mut state = BitmapState::default();
        state.start(BitmapOperator::Quality, eligible.len());
        for present in [true, false, true] {
            state.push_entry(present);
        }
        state.finish(&eligible).unwrap();
        assert!(!state.is_building());
        assert_eq!(state.next_target().unwrap(), 3);
        assert_eq!(state.next_target().unwrap(), 6);
        // Cycles for a second attribute per variable
        assert_eq!(state.next_target().unwrap(), 3);
    }

    #[test]
    fn test_bitmap_longer_than_history() {
        let mut state = BitmapState::default();
        state.start(BitmapOperator::Substituted, 1);
        state.push_entry(true);
        state.push_entry(true);
        assert!(matches!(state.finish(&[0]), Err(Error::Consistency(_))));
    }

    #[test]
    fn test_reuse() {
        let eligible = [0, 1];
        let mut state = BitmapState::default();
        assert!(state.reuse().is_err());

        state.start(BitmapOperator::Quality, 2);
        state.define_for_reuse();
        state.push_entry(false);
        state.push_entry(true);
        state.finish(&eligible).unwrap();

        state.start(BitmapOperator::Substituted, 2);
        state.reuse().unwrap();
        assert_eq!(state.operator(), Some(BitmapOperator::Substituted));
        assert_eq!(state.next_target().unwrap(), 1);

        state.cancel_reuse();
        assert!(state.reuse().is_err());
    }

    #[test]
    fn test_no_targets() {
        let mut state = BitmapState::default();
        assert!(state.next_target().is_err());
        state.start(BitmapOperator::Quality, 1);
        state.push_entry(false);
        state.finish(&[0]).unwrap();
        assert!(matches!(state.next_target(), Err(Error::Consistency(_))));
    }

    #[test]
    fn test_selects() {
        let t = Descriptor::b(12, 101);
        let confidence = Descriptor::b(33, 7);
        let plain = Variable::new(t, Value::Decimal(27315, -2));
        let with_quality = plain
            .clone()
            .with_attribute(Variable::new(confidence, Value::Integer(70)));
        let substituted = plain.clone().with_attribute(Variable::new(
            BitmapOperator::Substituted.marker(),
            Value::Decimal(27415, -2),
        ));
        assert!(!BitmapOperator::Quality.selects(&plain, &[confidence]));
        assert!(BitmapOperator::Quality.selects(&with_quality, &[confidence]));
        assert!(!BitmapOperator::Quality.selects(&with_quality, &[Descriptor::b(33, 2)]));
        assert!(!BitmapOperator::Substituted.selects(&with_quality, &[]));
        assert!(BitmapOperator::Substituted.selects(&substituted, &[]));
        assert!(!BitmapOperator::FirstOrderStatistics.selects(&substituted, &[]));
        assert_eq!(BitmapOperator::Replaced.marker(), Descriptor::c(32, 255));
    }
}
