//! Subset coding: one walk over the flat chain per subset

mod decode;
mod encode;

pub use decode::decode_subsets;
pub use encode::encode_subsets;

use smallvec::SmallVec;

use crate::{Descriptor, Error, Opcode, Value, operators::Field};

/// Cursor over a flat chain that replays replicated spans.
struct Walk<'c> {
    ops: &'c [Opcode],
    pos: usize,
    /// Stack of active replications
    stack: SmallVec<[Frame; 8]>,
}

struct Frame {
    start: usize,
    end: usize,
    /// Passes left, including the current one
    remaining: usize,
}

impl<'c> Walk<'c> {
    fn new(ops: &'c [Opcode]) -> Self {
        Self {
            ops,
            pos: 0,
            stack: SmallVec::new(),
        }
    }

    /// Index of the opcode `next` will return, before any replay.
    fn position(&self) -> usize {
        self.pos
    }

    fn ops(&self) -> &'c [Opcode] {
        self.ops
    }

    fn next(&mut self) -> Option<Opcode> {
        while let Some(top) = self.stack.last_mut() {
            if self.pos < top.end {
                break;
            }
            if top.remaining > 1 {
                top.remaining -= 1;
                self.pos = top.start;
            } else {
                self.stack.pop();
            }
        }
        let op = *self.ops.get(self.pos)?;
        self.pos += 1;
        Some(op)
    }

    /// Repeats the `span` opcodes at the cursor `count` times. A count of zero
    /// skips them.
    fn replicate(&mut self, span: usize, count: usize) -> Result<(), Error> {
        let start = self.pos;
        let end = start + span;
        if end > self.ops.len() {
            return Err(Error::Consistency(format!(
                "replication span of {span} runs past the end of the chain"
            )));
        }
        if count == 0 || span == 0 {
            self.pos = end;
        } else {
            self.stack.push(Frame {
                start,
                end,
                remaining: count,
            });
        }
        Ok(())
    }
}

/// Class 31 factors that carry a replication count.
fn is_replication_count(code: Descriptor) -> bool {
    code.x == 31 && matches!(code.y, 0..=2 | 11 | 12)
}

/// Whether a top-level variable can be referred to by a later bitmap.
fn is_bitmap_eligible(code: Descriptor) -> bool {
    code.f == 0 && !code.is_data_description_operator_qualifier()
}

fn numeric_value(field: &Field, raw: u64) -> Result<Value, Error> {
    let v = (raw as i64)
        .checked_add(field.reference)
        .ok_or_else(|| Error::Consistency(format!("{} overflows", field.code)))?;
    if field.scale == 0 {
        return Ok(Value::Integer(v));
    }
    let exponent = i8::try_from(-field.scale).map_err(|_| {
        Error::Consistency(format!("{} has scale {} out of range", field.code, field.scale))
    })?;
    Ok(Value::Decimal(v, exponent))
}

/// Raw field content for `value`, `None` for missing.
fn numeric_raw(field: &Field, value: &Value) -> Result<Option<u64>, Error> {
    let scaled = match value {
        Value::Missing => return Ok(None),
        Value::String(s) => {
            return Err(Error::Consistency(format!(
                "{} is numeric but the value is the string {s:?}",
                field.code
            )));
        }
        v => v.scaled(field.scale).ok_or_else(|| {
            Error::Consistency(format!("{} overflows at scale {}", field.code, field.scale))
        })?,
    };
    let raw = scaled
        .checked_sub(field.reference)
        .filter(|raw| *raw >= 0)
        .ok_or_else(|| {
            Error::Consistency(format!(
                "{value:?} is below the reference value of {}",
                field.code
            ))
        })?;
    Ok(Some(raw as u64))
}

/// Decoded text with trailing padding removed; missing when every byte is
/// 0xFF (missing).
fn string_value(code: Descriptor, bytes: Vec<u8>) -> Result<Value, Error> {
    if !bytes.is_empty() && bytes.iter().all(|b| *b == 0xff) {
        return Ok(Value::Missing);
    }
    let Ok(mut s) = String::from_utf8(bytes) else {
        return Err(Error::Consistency(format!(
            "{code} holds a character string that is not valid text"
        )));
    };
    let trimmed = s.trim_end_matches([' ', '\0']).len();
    s.truncate(trimmed);
    Ok(Value::String(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(walk: &mut Walk<'_>, counts: &[(usize, usize)]) -> Vec<Descriptor> {
        let mut counts = counts.iter();
        let mut out = Vec::new();
        while let Some(op) = walk.next() {
            out.push(op.descriptor());
            if let Opcode::Replication { span, .. } = op {
                let &(expected_span, count) = counts.next().unwrap();
                assert_eq!(span, expected_span);
                walk.replicate(span, count).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_walk_replays_nested_spans() {
        let a = Descriptor::b(4, 4);
        let b = Descriptor::b(5, 1);
        let c = Descriptor::b(6, 1);
        let ops = [
            Opcode::Replication {
                descriptor: Descriptor::r(3, 2),
                span: 4,
            },
            Opcode::Element(a),
            Opcode::Replication {
                descriptor: Descriptor::r(1, 3),
                span: 1,
            },
            Opcode::Element(b),
            Opcode::Element(c),
        ];
        let mut walk = Walk::new(&ops);
        let seen = collect(&mut walk, &[(4, 2), (1, 3), (1, 3)]);
        let r13 = Descriptor::r(1, 3);
        assert_eq!(
            seen,
            [
                Descriptor::r(3, 2),
                a,
                r13,
                b,
                b,
                b,
                c,
                a,
                r13,
                b,
                b,
                b,
                c
            ]
        );
    }

    #[test]
    fn test_walk_zero_count_skips() {
        let ops = [
            Opcode::Replication {
                descriptor: Descriptor::r(1, 0),
                span: 1,
            },
            Opcode::Element(Descriptor::b(5, 1)),
            Opcode::Element(Descriptor::b(6, 1)),
        ];
        let mut walk = Walk::new(&ops);
        assert!(walk.next().is_some());
        walk.replicate(1, 0).unwrap();
        assert_eq!(walk.next(), Some(Opcode::Element(Descriptor::b(6, 1))));
        assert_eq!(walk.next(), None);
        assert!(walk.replicate(3, 1).is_err());
    }

    #[test]
    fn test_string_value() {
        let code = Descriptor::b(1, 15);
        assert_eq!(
            string_value(code, b"ROMA  ".to_vec()).unwrap(),
            Value::String("ROMA".to_string())
        );
        assert_eq!(string_value(code, vec![0xff; 4]).unwrap(), Value::Missing);
        assert!(string_value(code, vec![0xc3, 0x28]).is_err());
    }
}
