//! Data section to subsets

use crate::{
    Descriptor, Error, FlatChain, Opcode, Subset, TableResolver, Value, Variable,
    bitmap::{BitmapOperator, DATA_PRESENT_INDICATOR},
    bits::BitReader,
    operators::{Field, Operator, OperatorState},
};

use super::{Walk, is_bitmap_eligible, is_replication_count, numeric_value, string_value};

/// Decodes `number_of_subsets` uncompressed subsets from a data section
/// payload (section 4 without its 4-byte header).
///
/// Subsets follow each other without byte alignment. Operator state starts
/// afresh for every subset.
pub fn decode_subsets<T: TableResolver + ?Sized>(
    chain: &FlatChain,
    tables: &T,
    data: &[u8],
    number_of_subsets: usize,
) -> Result<Vec<Subset>, Error> {
    let mut reader = BitReader::new(data);
    let mut subsets = Vec::new();
    subsets.try_reserve_exact(number_of_subsets)?;
    for idx in 0..number_of_subsets {
        let subset = SubsetDecoder::new(chain, tables, &mut reader).run()?;
        tracing::trace!(
            target: "bufrex::codec",
            subset = idx,
            variables = subset.len(),
            bit_offset = reader.position_bits(),
            "decoded subset"
        );
        subsets.push(subset);
    }
    if reader.remaining_bits() >= 8 {
        tracing::debug!(
            target: "bufrex::codec",
            remaining_bits = reader.remaining_bits(),
            "data section has trailing bytes after the last subset"
        );
    }
    Ok(subsets)
}

struct SubsetDecoder<'a, 'c, 'd, T: ?Sized> {
    walk: Walk<'c>,
    tables: &'a T,
    reader: &'a mut BitReader<'d>,
    state: OperatorState,
    subset: Subset,
    /// Indices of the top-level variables a bitmap can refer to
    eligible: Vec<usize>,
}

impl<'a, 'c, 'd, T: TableResolver + ?Sized> SubsetDecoder<'a, 'c, 'd, T> {
    fn new(chain: &'c FlatChain, tables: &'a T, reader: &'a mut BitReader<'d>) -> Self {
        Self {
            walk: Walk::new(chain.ops()),
            tables,
            reader,
            state: OperatorState::new(),
            subset: Subset::new(),
            eligible: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Subset, Error> {
        while let Some(op) = self.walk.next() {
            match op {
                Opcode::Element(d) => self.handle_element(d)?,
                Opcode::Replication { descriptor, span } => {
                    self.handle_replication(descriptor, span)?
                }
                Opcode::Operator(d) => self.handle_operator(d)?,
            }
        }
        self.settle_bitmap()?;
        Ok(self.subset)
    }

    fn emit(&mut self, var: Variable) {
        if is_bitmap_eligible(var.code) {
            self.eligible.push(self.subset.variables.len());
        }
        self.subset.push(var);
    }

    fn settle_bitmap(&mut self) -> Result<(), Error> {
        if self.state.bitmap.is_building() {
            self.state.bitmap.finish(&self.eligible)?;
        }
        Ok(())
    }

    fn read_field(&mut self, field: &Field) -> Result<Value, Error> {
        if field.is_string {
            let bytes = self.reader.read_string(field.chars())?;
            return string_value(field.code, bytes);
        }
        match self.reader.read_uint(field.width)? {
            None => Ok(Value::Missing),
            Some(raw) => numeric_value(field, raw),
        }
    }

    // f = 0
    fn handle_element(&mut self, d: Descriptor) -> Result<(), Error> {
        if let Some(bits) = self.state.reference_definition {
            let reference = self.reader.read_signed(bits)?;
            self.state.define_reference(d, reference);
            self.subset.new_references.push((d, reference));
            return Ok(());
        }
        if d == DATA_PRESENT_INDICATOR && self.state.bitmap.is_building() {
            let bit = self.reader.read_bits(1)?;
            self.state.bitmap.push_entry(bit == 0);
            return Ok(());
        }
        self.settle_bitmap()?;

        let tables = self.tables;
        let local_width = self.state.local_width.take();
        let info = match (tables.resolve(d), local_width) {
            (Ok(info), _) => info,
            (Err(Error::NotFound(_)), Some(width)) => {
                // 2 06: a local element the tables do not know, read as raw bits
                let value = match self.reader.read_uint(width)? {
                    None => Value::Missing,
                    Some(raw) => Value::Integer(raw as i64),
                };
                self.emit(Variable::new(d, value));
                return Ok(());
            }
            (Err(e), _) => return Err(e),
        };

        if self.state.skip_data(d) {
            self.emit(Variable::missing(d));
            return Ok(());
        }

        let field = self.state.field(&info, local_width)?;
        let associated = match self.state.associated_width(d) {
            0 => None,
            width => self.reader.read_uint(width)?,
        };
        let mut var = Variable::new(d, self.read_field(&field)?);
        var.associated = associated;

        if d.x == 33
            && self.state.bitmap.operator() == Some(BitmapOperator::Quality)
            && self.state.bitmap.is_active()
        {
            let target = self.state.bitmap.next_target()?;
            self.subset.variables[target].set_attribute(var);
        } else {
            self.emit(var);
        }
        Ok(())
    }

    // f = 1
    fn handle_replication(&mut self, descriptor: Descriptor, span: usize) -> Result<(), Error> {
        let (count, delayed) = self.tables.base_repeat_count(descriptor)?;
        let count = if delayed {
            let Some(Opcode::Element(count_code)) = self.walk.next() else {
                return Err(Error::Consistency(format!(
                    "delayed replication {descriptor} has no count element"
                )));
            };
            if !is_replication_count(count_code) {
                return Err(Error::Consistency(format!(
                    "{count_code} cannot hold the count of {descriptor}"
                )));
            }
            let tables = self.tables;
            let info = tables.resolve(count_code)?;
            let raw = self.reader.read_bits(info.bit_width)?;
            let count = raw as i64 + info.reference as i64;
            let Ok(count) = usize::try_from(count) else {
                return Err(Error::Consistency(format!(
                    "negative replication count {count} for {descriptor}"
                )));
            };
            self.emit(Variable::new(count_code, Value::Integer(count as i64)));
            count
        } else {
            count as usize
        };
        tracing::trace!(target: "bufrex::codec", %descriptor, count, span, "replication");
        self.walk.replicate(span, count)
    }

    // f = 2
    fn handle_operator(&mut self, d: Descriptor) -> Result<(), Error> {
        let op = Operator::parse(d)?;
        if self.state.apply(op) {
            return Ok(());
        }
        match op {
            Operator::CharacterInsert(chars) => {
                self.settle_bitmap()?;
                let bytes = self.reader.read_string(chars as usize)?;
                let value = string_value(d, bytes)?;
                self.emit(Variable::new(d, value));
            }
            Operator::Bitmap(kind) => {
                self.settle_bitmap()?;
                self.state.bitmap.start(kind, self.eligible.len());
            }
            Operator::Marker(kind) => {
                self.settle_bitmap()?;
                if self.state.bitmap.operator() != Some(kind) {
                    return Err(Error::Consistency(format!(
                        "{d} marker does not match the active bitmap"
                    )));
                }
                let target = self.state.bitmap.next_target()?;
                let code = self.subset.variables[target].code;
                let field = self.marker_field(kind, code)?;
                let value = self.read_field(&field)?;
                self.subset.variables[target].set_attribute(Variable::new(d, value));
            }
            Operator::DefineBitmap => self.state.bitmap.define_for_reuse(),
            Operator::UseDefinedBitmap => self.state.bitmap.reuse()?,
            Operator::CancelDefinedBitmap => self.state.bitmap.cancel_reuse(),
            Operator::CancelBackReference => {
                self.settle_bitmap()?;
                self.state.bitmap.cancel();
            }
            _ => {
                return Err(Error::NotFound(format!("Operator {d} is not supported")));
            }
        }
        Ok(())
    }

    fn marker_field(&mut self, kind: BitmapOperator, code: Descriptor) -> Result<Field, Error> {
        marker_field(&mut self.state, self.tables, kind, code)
    }
}

/// Coding of a value attached by a 255 marker: the target's own field, or
/// for difference statistics one bit wider and centred on zero.
///
/// The value is attached to the target under the marker descriptor.
pub(super) fn marker_field<T: TableResolver + ?Sized>(
    state: &mut OperatorState,
    tables: &T,
    kind: BitmapOperator,
    code: Descriptor,
) -> Result<Field, Error> {
    let info = tables.resolve(code)?;
    let mut field = state.field(&info, None)?;
    if kind == BitmapOperator::DifferenceStatistics && !field.is_string {
        field.reference = 1i64
            .checked_shl(field.width)
            .and_then(i64::checked_neg)
            .ok_or_else(|| {
                Error::Consistency(format!(
                    "{code} is {} bits wide, too wide for a difference statistic",
                    field.width
                ))
            })?;
        field.width += 1;
    }
    Ok(field)
}
