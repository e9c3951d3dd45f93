//! Template-driven encoder and decoder for BUFR meteorological messages.
//!
//! The core is the descriptor engine: a raw descriptor list is flattened by
//! [`expand`] against a [`TableResolver`], and the resulting [`FlatChain`] is
//! walked once per subset by [`decode_subsets`] / [`encode_subsets`].
//! [`Bulletin`] and [`MessageStream`] frame whole messages around it.

mod bitmap;
pub mod bits;
mod bulletin;
mod chain;
mod codec;
mod descriptor;
mod expand;
mod operators;
pub mod sections;
mod stream;
mod subset;
pub mod tables;

pub use bulletin::Bulletin;
pub use chain::DescriptorChain;
pub use codec::{decode_subsets, encode_subsets};
pub use descriptor::*;
pub use expand::{FlatChain, MAX_EXPANSION_DEPTH, Opcode, expand};
pub use operators::OperatorState;
pub use sections::{HeaderSections, ensure_end_section};
pub use stream::MessageStream;
pub use subset::{Subset, Variable};
pub use tables::{TableBEntry, TableDEntry, TableResolver, Tables, VarInfo};

/// The error type used by this crate.
///
/// Every variant aborts the message being coded; none is recoverable at the
/// field level.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unknown descriptor or table entry
    #[error("Not found: {0}")]
    NotFound(String),
    /// Malformed chain, value overflow, or any other structural problem
    #[error("Consistency error: {0}")]
    Consistency(String),
    /// Input ended before the descriptors did
    #[error("Truncated data: {0}")]
    Truncated(String),
    /// Resource exhaustion
    #[error("Allocation failed: {0}")]
    Allocation(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Truncated(err.to_string()),
            std::io::ErrorKind::OutOfMemory => Error::Allocation(err.to_string()),
            _ => Error::Consistency(err.to_string()),
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(err: std::collections::TryReserveError) -> Self {
        Error::Allocation(err.to_string())
    }
}

/// Primitive value in BUFR data.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Value {
    /// Missing value
    Missing,
    /// Scaled decimal value: `mantissa * 10^exponent`
    Decimal(i64, i8),
    /// Integer value
    Integer(i64),
    /// String value
    String(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            &Value::Decimal(v, s) => Some(v as f64 * 10f64.powi(s as i32)),
            &Value::Integer(v) => Some(v as f64),
            Value::Missing | Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value scaled by `10^scale`, rounded to nearest.
    ///
    /// This is the inverse of the decoding rule `raw * 10^-scale`, so a value
    /// decoded with a given scale comes back unchanged.
    pub fn scaled(&self, scale: i32) -> Option<i64> {
        match self {
            &Value::Integer(v) => scale_mantissa(v, scale),
            &Value::Decimal(v, e) => scale_mantissa(v, scale + e as i32),
            Value::Missing | Value::String(_) => None,
        }
    }
}

fn scale_mantissa(mantissa: i64, exponent: i32) -> Option<i64> {
    if exponent >= 0 {
        10i64
            .checked_pow(exponent as u32)
            .and_then(|p| mantissa.checked_mul(p))
    } else {
        let p = 10i64.checked_pow(exponent.unsigned_abs())?;
        let half = p / 2;
        let rounded = if mantissa >= 0 {
            mantissa.checked_add(half)?
        } else {
            mantissa.checked_sub(half)?
        };
        Some(rounded / p)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Missing => write!(f, "Missing"),
            &Value::Decimal(v, s) => {
                write!(
                    f,
                    "{:.1$}",
                    v as f64 * 10f64.powi(s as i32),
                    if s < 0 { -s } else { 0 } as usize
                )
            }
            Value::Integer(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{s}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_fmt() {
        assert_eq!(format!("{:?}", Value::Missing), "Missing");
        assert_eq!(format!("{:?}", Value::Decimal(1234, -2)), "12.34");
        assert_eq!(format!("{:?}", Value::Decimal(1234, 2)), "123400");
        assert_eq!(format!("{:?}", Value::Integer(42)), "42");
        assert_eq!(
            format!("{:?}", Value::String("Hello".to_string())),
            "\"Hello\""
        );
    }

    #[test]
    fn test_value_scaled() {
        assert_eq!(Value::Decimal(1234, -2).scaled(2), Some(1234));
        assert_eq!(Value::Decimal(1234, -2).scaled(1), Some(123));
        assert_eq!(Value::Decimal(1235, -2).scaled(1), Some(124));
        assert_eq!(Value::Decimal(-1235, -2).scaled(1), Some(-124));
        assert_eq!(Value::Integer(5).scaled(-1), Some(1));
        assert_eq!(Value::Integer(101325).scaled(-1), Some(10133));
        assert_eq!(Value::Integer(7).scaled(3), Some(7000));
        assert_eq!(Value::Decimal(i64::MAX, -2).scaled(1), None);
        assert_eq!(Value::Decimal(i64::MIN, -2).scaled(1), None);
        assert_eq!(Value::Decimal(i64::MAX, -2).scaled(2), Some(i64::MAX));
        assert_eq!(Value::Missing.scaled(0), None);
        assert_eq!(Value::from("x").scaled(0), None);
    }

    #[test]
    fn test_io_error_mapping() {
        let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(matches!(Error::from(eof), Error::Truncated(_)));
        let other = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(matches!(Error::from(other), Error::Consistency(_)));
    }
}
