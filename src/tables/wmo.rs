//! Built-in subset of the WMO master tables (edition 4, version 13 and later)
//!
//! Only entries with a stable definition across master table versions are
//! listed: station identification, date/time, location, a few common
//! observations and the class 31/33 entries the operators rely on.

use crate::{Descriptor, XY};

use super::{TableBEntry, TableDEntry};

#[allow(clippy::too_many_arguments)]
const fn b(
    x: u8,
    y: u8,
    class_name: &'static str,
    element_name: &'static str,
    unit: &'static str,
    scale: i8,
    reference_value: i32,
    bits: u16,
) -> TableBEntry {
    TableBEntry {
        xy: XY { x, y },
        class_name,
        element_name,
        unit,
        scale,
        reference_value,
        bits,
    }
}

pub static WMO_TABLE_B: [TableBEntry; 35] = [
    b(1, 1, "Identification", "WMO BLOCK NUMBER", "Numeric", 0, 0, 7),
    b(1, 2, "Identification", "WMO STATION NUMBER", "Numeric", 0, 0, 10),
    b(1, 15, "Identification", "STATION OR SITE NAME", "CCITT IA5", 0, 0, 160),
    b(1, 19, "Identification", "LONG STATION OR SITE NAME", "CCITT IA5", 0, 0, 256),
    b(1, 31, "Identification", "IDENTIFICATION OF ORIGINATING/GENERATING CENTRE", "Code table", 0, 0, 16),
    b(1, 32, "Identification", "GENERATING APPLICATION", "Code table", 0, 0, 8),
    b(2, 1, "Instrumentation", "TYPE OF STATION", "Code table", 0, 0, 2),
    b(4, 1, "Location (time)", "YEAR", "a", 0, 0, 12),
    b(4, 2, "Location (time)", "MONTH", "mon", 0, 0, 4),
    b(4, 3, "Location (time)", "DAY", "d", 0, 0, 6),
    b(4, 4, "Location (time)", "HOUR", "h", 0, 0, 5),
    b(4, 5, "Location (time)", "MINUTE", "min", 0, 0, 6),
    b(4, 6, "Location (time)", "SECOND", "s", 0, 0, 6),
    b(5, 1, "Location (horizontal - 1)", "LATITUDE (HIGH ACCURACY)", "deg", 5, -9000000, 25),
    b(5, 2, "Location (horizontal - 1)", "LATITUDE (COARSE ACCURACY)", "deg", 2, -9000, 15),
    b(6, 1, "Location (horizontal - 2)", "LONGITUDE (HIGH ACCURACY)", "deg", 5, -18000000, 26),
    b(6, 2, "Location (horizontal - 2)", "LONGITUDE (COARSE ACCURACY)", "deg", 2, -18000, 16),
    b(7, 1, "Location (vertical)", "HEIGHT OF STATION", "m", 0, -400, 15),
    b(7, 30, "Location (vertical)", "HEIGHT OF STATION GROUND ABOVE MEAN SEA LEVEL", "m", 1, -4000, 17),
    b(7, 31, "Location (vertical)", "HEIGHT OF BAROMETER ABOVE MEAN SEA LEVEL", "m", 1, -4000, 17),
    b(8, 23, "Significance qualifiers", "FIRST-ORDER STATISTICS", "Code table", 0, 0, 6),
    b(10, 4, "Non-coordinate location (vertical)", "PRESSURE", "Pa", -1, 0, 14),
    b(10, 51, "Non-coordinate location (vertical)", "PRESSURE REDUCED TO MEAN SEA LEVEL", "Pa", -1, 0, 14),
    b(11, 1, "Wind and turbulence", "WIND DIRECTION", "degree true", 0, 0, 9),
    b(11, 2, "Wind and turbulence", "WIND SPEED", "m/s", 1, 0, 12),
    b(12, 101, "Temperature", "TEMPERATURE/AIR TEMPERATURE", "K", 2, 0, 16),
    b(12, 103, "Temperature", "DEWPOINT TEMPERATURE", "K", 2, 0, 16),
    b(13, 3, "Hydrographic and hydrological elements", "RELATIVE HUMIDITY", "%", 0, 0, 7),
    b(31, 0, "Data description operator qualifiers", "SHORT DELAYED DESCRIPTOR REPLICATION FACTOR", "Numeric", 0, 0, 1),
    b(31, 1, "Data description operator qualifiers", "DELAYED DESCRIPTOR REPLICATION FACTOR", "Numeric", 0, 0, 8),
    b(31, 2, "Data description operator qualifiers", "EXTENDED DELAYED DESCRIPTOR REPLICATION FACTOR", "Numeric", 0, 0, 16),
    b(31, 21, "Data description operator qualifiers", "ASSOCIATED FIELD SIGNIFICANCE", "Code table", 0, 0, 6),
    b(31, 31, "Data description operator qualifiers", "DATA PRESENT INDICATOR", "Flag table", 0, 0, 1),
    b(33, 2, "Quality information", "QUALITY INFORMATION", "Code table", 0, 0, 2),
    b(33, 7, "Quality information", "PER CENT CONFIDENCE", "%", 0, 0, 7),
];

pub static WMO_TABLE_D: [TableDEntry; 5] = [
    TableDEntry {
        xy: XY { x: 1, y: 1 },
        category: "Location and identification sequences",
        title: "WMO block and station numbers",
        elements: &[Descriptor::b(1, 1), Descriptor::b(1, 2)],
    },
    TableDEntry {
        xy: XY { x: 1, y: 11 },
        category: "Location and identification sequences",
        title: "Year, month, day",
        elements: &[Descriptor::b(4, 1), Descriptor::b(4, 2), Descriptor::b(4, 3)],
    },
    TableDEntry {
        xy: XY { x: 1, y: 12 },
        category: "Location and identification sequences",
        title: "Hour, minute",
        elements: &[Descriptor::b(4, 4), Descriptor::b(4, 5)],
    },
    TableDEntry {
        xy: XY { x: 1, y: 13 },
        category: "Location and identification sequences",
        title: "Hour, minute, second",
        elements: &[Descriptor::b(4, 4), Descriptor::b(4, 5), Descriptor::b(4, 6)],
    },
    TableDEntry {
        xy: XY { x: 1, y: 21 },
        category: "Location and identification sequences",
        title: "Latitude/longitude (high accuracy)",
        elements: &[Descriptor::b(5, 1), Descriptor::b(6, 1)],
    },
];
