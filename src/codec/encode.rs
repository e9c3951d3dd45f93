//! Subsets to data section

use crate::{
    Descriptor, Error, FlatChain, Opcode, Subset, TableResolver, Value, Variable,
    bitmap::{BitmapOperator, DATA_PRESENT_INDICATOR, candidates_start},
    bits::BitWriter,
    operators::{Field, Operator, OperatorState},
};

use super::{Walk, decode::marker_field, is_bitmap_eligible, is_replication_count, numeric_raw};

/// Encodes subsets against a flat chain, producing the data section payload
/// (section 4 without its 4-byte header), zero padded to a whole byte.
///
/// Every subset has to hold exactly the variables a decode of the same chain
/// would produce: delayed replication counts included, attributes attached
/// to the variables they qualify.
pub fn encode_subsets<T: TableResolver + ?Sized>(
    chain: &FlatChain,
    tables: &T,
    subsets: &[Subset],
) -> Result<Vec<u8>, Error> {
    let mut writer = BitWriter::new();
    for (idx, subset) in subsets.iter().enumerate() {
        SubsetEncoder::new(chain, tables, subset, &mut writer).run()?;
        tracing::trace!(
            target: "bufrex::codec",
            subset = idx,
            bits = writer.bits_written(),
            "encoded subset"
        );
    }
    writer.finish()
}

struct SubsetEncoder<'a, 'c, T: ?Sized> {
    walk: Walk<'c>,
    tables: &'a T,
    writer: &'a mut BitWriter,
    state: OperatorState,
    subset: &'a Subset,
    /// Next top-level variable to code
    next_var: usize,
    next_reference: usize,
    eligible: Vec<usize>,
    /// Entries of the bitmap being written, `true` for data present
    planned: Vec<bool>,
}

impl<'a, 'c, T: TableResolver + ?Sized> SubsetEncoder<'a, 'c, T> {
    fn new(chain: &'c FlatChain, tables: &'a T, subset: &'a Subset, writer: &'a mut BitWriter) -> Self {
        Self {
            walk: Walk::new(chain.ops()),
            tables,
            writer,
            state: OperatorState::new(),
            subset,
            next_var: 0,
            next_reference: 0,
            eligible: Vec::new(),
            planned: Vec::new(),
        }
    }

    fn run(mut self) -> Result<(), Error> {
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
        let unused = self.subset.len() - self.next_var;
        if unused > 0 {
            return Err(Error::Consistency(format!(
                "{unused} variables left over after the descriptor chain ended"
            )));
        }
        Ok(())
    }

    /// Takes the next top-level variable, which must have the given code.
    fn take(&mut self, code: Descriptor) -> Result<&'a Variable, Error> {
        let subset: &'a Subset = self.subset;
        let Some(var) = subset.variables.get(self.next_var) else {
            return Err(Error::Consistency(format!(
                "subset ended before {code}: only {} variables",
                subset.len()
            )));
        };
        if var.code != code {
            return Err(Error::Consistency(format!(
                "variable {} is {} but the chain expects {code}",
                self.next_var, var.code
            )));
        }
        if is_bitmap_eligible(code) {
            self.eligible.push(self.next_var);
        }
        self.next_var += 1;
        Ok(var)
    }

    fn settle_bitmap(&mut self) -> Result<(), Error> {
        if self.state.bitmap.is_building() {
            if self.state.bitmap.entry_count() != self.planned.len() {
                return Err(Error::Consistency(format!(
                    "bitmap has {} entries, expected {}",
                    self.state.bitmap.entry_count(),
                    self.planned.len()
                )));
            }
            self.state.bitmap.finish(&self.eligible)?;
        }
        Ok(())
    }

    fn write_field(&mut self, field: &Field, value: &Value) -> Result<(), Error> {
        if field.is_string {
            return match value {
                Value::String(s) => self.writer.write_string(s.as_bytes(), field.chars()),
                Value::Missing => self.writer.write_missing_string(field.chars()),
                v => Err(Error::Consistency(format!(
                    "{} is a character string but the value is {v:?}",
                    field.code
                ))),
            };
        }
        let raw = numeric_raw(field, value)?;
        self.writer.write_uint(field.width, raw)
    }

    // f = 0
    fn handle_element(&mut self, d: Descriptor) -> Result<(), Error> {
        if let Some(bits) = self.state.reference_definition {
            let Some(&(code, reference)) = self.subset.new_references.get(self.next_reference)
            else {
                return Err(Error::Consistency(format!(
                    "no new reference value for {d}"
                )));
            };
            if code != d {
                return Err(Error::Consistency(format!(
                    "new reference value is for {code} but the chain defines {d}"
                )));
            }
            self.writer.write_signed(bits, reference)?;
            self.state.define_reference(d, reference);
            self.next_reference += 1;
            return Ok(());
        }
        if d == DATA_PRESENT_INDICATOR && self.state.bitmap.is_building() {
            let Some(&present) = self.planned.get(self.state.bitmap.entry_count()) else {
                return Err(Error::Consistency(
                    "more bitmap entries than planned".to_string(),
                ));
            };
            self.writer.write_bits(1, if present { 0 } else { 1 })?;
            self.state.bitmap.push_entry(present);
            return Ok(());
        }
        self.settle_bitmap()?;

        let tables = self.tables;
        let local_width = self.state.local_width.take();
        let info = match (tables.resolve(d), local_width) {
            (Ok(info), _) => info,
            (Err(Error::NotFound(_)), Some(width)) => {
                let var = self.take(d)?;
                let raw = match var.value {
                    Value::Missing => None,
                    Value::Integer(v) if v >= 0 => Some(v as u64),
                    ref v => {
                        return Err(Error::Consistency(format!(
                            "local element {d} needs a non-negative integer, got {v:?}"
                        )));
                    }
                };
                return self.writer.write_uint(width, raw);
            }
            (Err(e), _) => return Err(e),
        };

        if self.state.skip_data(d) {
            let var = self.take(d)?;
            if !var.value.is_missing() {
                return Err(Error::Consistency(format!(
                    "{d} carries {:?} but falls in a data-not-present run",
                    var.value
                )));
            }
            return Ok(());
        }

        let field = self.state.field(&info, local_width)?;
        let quality = d.x == 33
            && self.state.bitmap.operator() == Some(BitmapOperator::Quality)
            && self.state.bitmap.is_active();
        let subset: &'a Subset = self.subset;
        let var = if quality {
            let target = self.state.bitmap.next_target()?;
            let target = &subset.variables[target];
            target.attribute(d).ok_or_else(|| {
                Error::Consistency(format!(
                    "{} is marked by the quality bitmap but has no {d} attribute",
                    target.code
                ))
            })?
        } else {
            self.take(d)?
        };

        match self.state.associated_width(d) {
            0 => {}
            width => self.writer.write_uint(width, var.associated)?,
        }
        self.write_field(&field, &var.value)
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
            let var = self.take(count_code)?;
            let count = count_of(var)?;
            let raw = (count as i64)
                .checked_sub(info.reference as i64)
                .filter(|raw| *raw >= 0)
                .ok_or_else(|| {
                    Error::Consistency(format!("count {count} below the reference of {count_code}"))
                })?;
            self.writer.write_bits(info.bit_width, raw as u64)?;
            count
        } else {
            count as usize
        };
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
                let var = self.take(d)?;
                match &var.value {
                    Value::String(s) => self.writer.write_string(s.as_bytes(), chars as usize)?,
                    Value::Missing => self.writer.write_missing_string(chars as usize)?,
                    v => {
                        return Err(Error::Consistency(format!(
                            "{d} inserts characters but the value is {v:?}"
                        )));
                    }
                }
            }
            Operator::Bitmap(kind) => {
                self.settle_bitmap()?;
                let anchor = self.eligible.len();
                self.state.bitmap.start(kind, anchor);
                let (len, end) = self.bitmap_length()?;
                let first = candidates_start(anchor, len)?;
                let quality_codes = match kind {
                    BitmapOperator::Quality => self.quality_codes(end),
                    _ => Vec::new(),
                };
                let subset = self.subset;
                self.planned = self.eligible[first..anchor]
                    .iter()
                    .map(|&i| kind.selects(&subset.variables[i], &quality_codes))
                    .collect();
            }
            Operator::Marker(kind) => {
                self.settle_bitmap()?;
                if self.state.bitmap.operator() != Some(kind) {
                    return Err(Error::Consistency(format!(
                        "{d} marker does not match the active bitmap"
                    )));
                }
                let target = self.state.bitmap.next_target()?;
                let var = &self.subset.variables[target];
                let field = marker_field(&mut self.state, self.tables, kind, var.code)?;
                let value = var
                    .attribute(d)
                    .map_or(Value::Missing, |a| a.value.clone());
                self.write_field(&field, &value)?;
            }
            Operator::DefineBitmap => self.state.bitmap.define_for_reuse(),
            Operator::UseDefinedBitmap => {
                self.state.bitmap.reuse()?;
                self.planned.clear();
            }
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

    /// Number of 031031 entries the bitmap after the cursor will hold, and
    /// the chain position right after them.
    ///
    /// Looks ahead over plain entries, 2 36 000, and replications whose body
    /// is made only of entries. Delayed counts are read from the variables
    /// still to be coded.
    fn bitmap_length(&self) -> Result<(usize, usize), Error> {
        let ops = self.walk.ops();
        let mut pos = self.walk.position();
        let mut peek = self.next_var;
        let mut len = 0usize;
        while let Some(op) = ops.get(pos) {
            match *op {
                Opcode::Element(d) if d == DATA_PRESENT_INDICATOR => {
                    len += 1;
                    pos += 1;
                }
                Opcode::Operator(d) if d == Descriptor::c(36, 0) => pos += 1,
                Opcode::Replication { descriptor, span } => {
                    let (count, delayed) = self.tables.base_repeat_count(descriptor)?;
                    let mut body = pos + 1;
                    let count = if delayed {
                        body += 1;
                        let var = self.subset.variables.get(peek).ok_or_else(|| {
                            Error::Consistency(format!(
                                "subset ended before the count of {descriptor}"
                            ))
                        })?;
                        peek += 1;
                        count_of(var)?
                    } else {
                        count as usize
                    };
                    let entries = ops.get(body..body + span).ok_or_else(|| {
                        Error::Consistency(format!("{descriptor} runs past the end of the chain"))
                    })?;
                    if !entries
                        .iter()
                        .all(|op| *op == Opcode::Element(DATA_PRESENT_INDICATOR))
                    {
                        break;
                    }
                    len += count * span;
                    pos = body + span;
                }
                _ => break,
            }
        }
        Ok((len, pos))
    }

    /// Class 33 elements of the chain from `from` up to the next bitmap,
    /// the codes a quality bitmap there gives values for.
    fn quality_codes(&self, from: usize) -> Vec<Descriptor> {
        let mut codes = Vec::new();
        for op in self.walk.ops().get(from..).unwrap_or_default() {
            match *op {
                Opcode::Element(d) if d.x == 33 => {
                    if !codes.contains(&d) {
                        codes.push(d);
                    }
                }
                Opcode::Operator(d) if ends_quality_values(d) => break,
                _ => {}
            }
        }
        codes
    }
}

/// A new bitmap, or the cancellation of back references.
fn ends_quality_values(d: Descriptor) -> bool {
    matches!((d.x, d.y), (22..=25 | 32, 0) | (35, 0) | (37, 0))
}

fn count_of(var: &Variable) -> Result<usize, Error> {
    match var.value {
        Value::Integer(n) if n >= 0 => Ok(n as usize),
        ref v => Err(Error::Consistency(format!(
            "replication count {} must be a non-negative integer, got {v:?}",
            var.code
        ))),
    }
}
