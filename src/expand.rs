//! Flattening of sequence descriptors

use std::fmt::Display;

use crate::{Descriptor, DescriptorChain, DescriptorKind, Error, TableResolver};

/// Nesting bound for sequences and replications. WMO tables never come close;
/// a malformed local table that refers back to itself does.
pub const MAX_EXPANSION_DEPTH: usize = 32;

/// One step of a flattened chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Opcode {
    Element(Descriptor),
    /// Repeats the `span` opcodes that follow it. For delayed replication
    /// the count element sits right after this opcode and is not part of
    /// the span.
    Replication { descriptor: Descriptor, span: usize },
    Operator(Descriptor),
}

impl Opcode {
    pub fn descriptor(&self) -> Descriptor {
        match *self {
            Opcode::Element(d) | Opcode::Operator(d) => d,
            Opcode::Replication { descriptor, .. } => descriptor,
        }
    }
}

/// A descriptor chain with every sequence expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlatChain {
    ops: Vec<Opcode>,
}

impl FlatChain {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    pub fn get(&self, idx: usize) -> Option<&Opcode> {
        self.ops.get(idx)
    }

    /// The flat chain as plain descriptors.
    pub fn descriptors(&self) -> DescriptorChain {
        self.ops.iter().map(Opcode::descriptor).collect()
    }
}

impl Display for FlatChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match op {
                Opcode::Replication { descriptor, span } => write!(f, "{descriptor}[{span}]")?,
                op => write!(f, "{}", op.descriptor())?,
            }
        }
        Ok(())
    }
}

/// Expands every sequence descriptor of `raw`, recursively.
///
/// Elements and operators pass through unchanged. A replication keeps its
/// delayed-count element next to it, and its span is recomputed over the
/// expanded body so the walker can repeat it without looking at tables.
pub fn expand<T: TableResolver + ?Sized>(
    raw: &DescriptorChain,
    tables: &T,
) -> Result<FlatChain, Error> {
    let mut ops = Vec::with_capacity(raw.len());
    expand_into(raw.as_slice(), tables, 0, &mut ops)?;
    tracing::debug!(
        target: "bufrex::expand",
        raw = raw.len(),
        flat = ops.len(),
        "expanded descriptor chain"
    );
    Ok(FlatChain { ops })
}

fn expand_into<T: TableResolver + ?Sized>(
    work: &[Descriptor],
    tables: &T,
    depth: usize,
    out: &mut Vec<Opcode>,
) -> Result<(), Error> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(Error::Consistency(format!(
            "descriptor expansion deeper than {MAX_EXPANSION_DEPTH} levels"
        )));
    }

    let mut rest = work;
    while let Some((&desc, tail)) = rest.split_first() {
        rest = tail;
        match desc.kind() {
            DescriptorKind::Element => out.push(Opcode::Element(desc)),
            DescriptorKind::Operator => out.push(Opcode::Operator(desc)),
            DescriptorKind::Sequence => {
                let sequence = tables.expand_sequence(desc)?;
                tracing::trace!(
                    target: "bufrex::expand",
                    sequence = %desc,
                    depth,
                    "expanding sequence"
                );
                expand_into(sequence.as_slice(), tables, depth + 1, out)?;
            }
            DescriptorKind::Replication => {
                let (_, delayed) = tables.base_repeat_count(desc)?;
                let at = out.len();
                out.push(Opcode::Replication {
                    descriptor: desc,
                    span: 0,
                });
                if delayed {
                    let Some((&count, tail)) = rest.split_first() else {
                        return Err(Error::Consistency(format!(
                            "delayed replication {desc} is not followed by a count descriptor"
                        )));
                    };
                    rest = tail;
                    if !count.is_data_description_operator_qualifier() {
                        return Err(Error::Consistency(format!(
                            "delayed replication {desc} is followed by {count} instead of a class 31 count"
                        )));
                    }
                    out.push(Opcode::Element(count));
                }
                let Some((body, tail)) = rest.split_at_checked(desc.x as usize) else {
                    return Err(Error::Consistency(format!(
                        "{desc} replicates {} descriptors but only {} follow",
                        desc.x,
                        rest.len()
                    )));
                };
                rest = tail;
                let start = out.len();
                expand_into(body, tables, depth + 1, out)?;
                let span = out.len() - start;
                out[at] = Opcode::Replication {
                    descriptor: desc,
                    span,
                };
            }
        }
    }
    Ok(())
}
