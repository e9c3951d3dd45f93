use bufrex::*;

mod common;

use common::{decimal, int};

static LOCAL_B: TableBEntry = TableBEntry {
    xy: XY { x: 48, y: 1 },
    class_name: "local",
    element_name: "LOCAL COUNTER",
    unit: "Numeric",
    scale: 0,
    reference_value: 0,
    bits: 10,
};

fn message(tables: &Tables, block: i64, extra: Option<Descriptor>) -> Vec<u8> {
    let mut descriptors = DescriptorChain::from(vec![Descriptor::d(1, 1), Descriptor::b(12, 101)]);
    let mut subset = Subset::from_iter([
        int(Descriptor::b(1, 1), block),
        int(Descriptor::b(1, 2), 144),
        decimal(Descriptor::b(12, 101), 27315, -2),
    ]);
    if let Some(code) = extra {
        descriptors.append(code);
        subset.push(int(code, 512));
    }
    Bulletin {
        descriptors,
        subsets: vec![subset],
        ..Default::default()
    }
    .encode(tables)
    .unwrap()
}

#[test]
fn test_stream_skips_and_reports_bad_messages() {
    let tables = Tables::wmo();
    let mut local_tables = Tables::wmo();
    local_tables.insert_b(&LOCAL_B);

    let unknown = message(&local_tables, 10, Some(Descriptor::b(48, 1)));
    let mut buf = b"ISMD01 LIIB 171200\r\r\n".to_vec();
    buf.extend(message(&tables, 16, None));
    buf.extend(b"\r\r\n");
    buf.extend(&unknown);
    buf.extend(message(&tables, 17, None));

    let mut rejected = Vec::new();
    let results: Vec<_> = MessageStream::new(&buf, &tables)
        .with_rejects(|raw, err| rejected.push((raw.to_vec(), err.to_string())))
        .collect();

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.subsets[0].variables[0].value, Value::Integer(16));
    assert!(matches!(results[1], Err(Error::NotFound(_))));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.subsets[0].variables[0].value, Value::Integer(17));

    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].0, unknown);
    assert!(rejected[0].1.contains("Not found"));
}

#[test]
fn test_stream_resynchronises_after_bad_length() {
    let tables = Tables::wmo();
    let mut broken = message(&tables, 16, None);
    // Declared length no longer lands on the end section
    broken[6] = broken[6].wrapping_sub(2);

    let mut buf = broken.clone();
    buf.extend(message(&tables, 17, None));

    let mut rejected = Vec::new();
    let results: Vec<_> = MessageStream::new(&buf, &tables)
        .with_rejects(|raw, _| rejected.push(raw.len()))
        .collect();

    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Err(Error::Consistency(_))));
    assert_eq!(
        results[1].as_ref().unwrap().subsets[0].variables[0].value,
        Value::Integer(17)
    );
    assert_eq!(rejected, [broken.len()]);
}

#[test]
fn test_stream_without_messages() {
    let tables = Tables::wmo();
    let mut stream = MessageStream::new(b"no bulletins here", &tables);
    assert!(stream.next().is_none());
    assert_eq!(stream.position(), 17);

    let results: Vec<_> = MessageStream::new(b"BUFR\0\0", &tables).collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Truncated(_))));
}
