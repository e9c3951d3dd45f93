#![allow(dead_code)]

use bufrex::*;

// Narrow variants of two WMO entries, so hand-assembled data stays short
pub static SHORT_TABLE_B: &[TableBEntry] = &[
    TableBEntry {
        xy: XY { x: 5, y: 1 },
        class_name: "test",
        element_name: "LATITUDE (SHORT)",
        unit: "deg",
        scale: 2,
        reference_value: 0,
        bits: 15,
    },
    TableBEntry {
        xy: XY { x: 1, y: 2 },
        class_name: "test",
        element_name: "STATION NUMBER (SHORT)",
        unit: "Numeric",
        scale: 0,
        reference_value: 0,
        bits: 8,
    },
];

pub fn short_tables() -> Tables {
    let mut tables = Tables::empty();
    for entry in SHORT_TABLE_B {
        tables.insert_b(entry);
    }
    tables
}

pub fn flat(tables: &Tables, descriptors: &[Descriptor]) -> FlatChain {
    expand(&DescriptorChain::from(descriptors), tables).unwrap()
}

pub fn int(code: Descriptor, value: i64) -> Variable {
    Variable::new(code, Value::Integer(value))
}

pub fn text(code: Descriptor, value: &str) -> Variable {
    Variable::new(code, Value::from(value))
}

pub fn decimal(code: Descriptor, mantissa: i64, exponent: i8) -> Variable {
    Variable::new(code, Value::Decimal(mantissa, exponent))
}

/// Encodes the subsets, decodes them back and checks nothing changed.
/// Returns the encoded data.
pub fn assert_roundtrip(chain: &FlatChain, tables: &Tables, subsets: &[Subset]) -> Vec<u8> {
    let data = encode_subsets(chain, tables, subsets).unwrap();
    let decoded = decode_subsets(chain, tables, &data, subsets.len()).unwrap();
    println!("{}", serde_json::to_string_pretty(&decoded).unwrap());
    assert_eq!(decoded, subsets);
    assert_eq!(encode_subsets(chain, tables, &decoded).unwrap(), data);
    data
}
