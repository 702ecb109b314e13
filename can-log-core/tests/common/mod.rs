//! Fixture writers shared by the integration tests

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub const VEHICLE_DBC: &str = r#"VERSION "1.0"

NS_ :

BS_:

BU_: ECU

BO_ 291 Vehicle: 8 ECU
 SG_ Speed : 0|16@1+ (0.1,0) [0|6553.5] "km/h" Vector__XXX
 SG_ Gear : 16|8@1+ (1,0) [0|7] "" Vector__XXX

VAL_ 291 Gear 0 "Park" 1 "Drive" ;
"#;

/// Same message, unscaled speed
pub const VEHICLE_RAW_DBC: &str = r#"VERSION "2.0"

NS_ :

BS_:

BU_: ECU

BO_ 291 Vehicle: 8 ECU
 SG_ Speed : 0|16@1+ (1,0) [0|65535] "" Vector__XXX

"#;

/// Signed Motorola temperature plus two overlapping little-endian signals
pub const CLIMATE_DBC: &str = r#"VERSION "1.0"

NS_ :

BS_:

BU_: ECU

BO_ 1024 Climate: 8 ECU
 SG_ T : 7|12@0- (0.5,-40) [-1064|983.5] "degC" Vector__XXX
 SG_ Word : 16|16@1+ (1,0) [0|65535] "" Vector__XXX
 SG_ LowByte : 16|8@1+ (1,0) [0|255] "" Vector__XXX

"#;

pub fn text_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn asc_log(lines: &[&str]) -> NamedTempFile {
    let mut content = String::from("date Mon Nov 1 10:30:00.000 2021\nbase hex  timestamps absolute\n");
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    text_file(&content)
}

pub fn blf_header(object_count: u32) -> Vec<u8> {
    let mut out = vec![0u8; 144];
    out[..4].copy_from_slice(b"LOGG");
    out[4..8].copy_from_slice(&144u32.to_le_bytes());
    out[32..36].copy_from_slice(&object_count.to_le_bytes());
    out
}

/// CAN_MESSAGE2 object with a nanosecond timestamp, padded to 4 bytes
pub fn blf_can_message(ns: u64, id: u32, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_le_bytes());
    body.push(0);
    body.push(data.len() as u8);
    body.extend_from_slice(&id.to_le_bytes());
    let mut payload = [0u8; 8];
    payload[..data.len()].copy_from_slice(data);
    body.extend_from_slice(&payload);
    body.extend_from_slice(&[0u8; 8]);

    let header_size = 32u16;
    let size = header_size as u32 + body.len() as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"LOBJ");
    out.extend_from_slice(&header_size.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&86u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&ns.to_le_bytes());
    out.extend_from_slice(&body);
    let padding = out.len() % 4;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

pub fn binary_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
