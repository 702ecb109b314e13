//! End-to-end tests: import, decode, switch databases

mod common;

use can_log_core::{
    Analyzer, AnalyzerConfig, AnalyzerError, DatasetState, DecodeOutcome, LogRecord, ParseWarningKind,
};
use common::*;
use std::path::{Path, PathBuf};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_asc_with_malformed_line() {
    init_logging();
    let log = asc_log(&[
        "   0.010000 1  123  Rx   d 8 10 27 00 00 00 00 00 00",
        "   0.020000 1  456  Rx   d 8",
        "   0.030000 1  123  Tx   d 8 20 4E 01 00 00 00 00 00",
    ]);

    let analyzer = Analyzer::default();
    let dataset = analyzer.import_log(log.path()).unwrap();

    assert_eq!(dataset.record_count(), 2);
    let summary = dataset.summary();
    assert_eq!(summary.warning_count(), 1);
    assert_eq!(summary.sources[0].parse.warnings[0].kind, ParseWarningKind::MalformedLine);
    assert_eq!(summary.rx_count, 1);
    assert_eq!(summary.tx_count, 1);
    assert!(summary.start_time.is_some());
}

#[test]
fn test_decode_speed_on_import() {
    init_logging();
    let mut analyzer = Analyzer::default();
    analyzer
        .import_definitions_str(Path::new("vehicle.dbc"), VEHICLE_DBC)
        .unwrap();
    let log = asc_log(&["   0.010000 1  123  Rx   d 8 10 27 01 00 00 00 00 00"]);
    let dataset = analyzer.import_log(log.path()).unwrap();

    assert_eq!(dataset.state(), DatasetState::Decoded);
    let row = dataset.record_at(0).unwrap();
    assert_eq!(row.message_name(), Some("Vehicle"));
    // 0x2710 = 10000 raw
    let speed = row.signal("Speed").unwrap();
    assert_eq!(speed.raw, 10000);
    assert!((speed.physical - 1000.0).abs() < 1e-9);
    assert_eq!(speed.unit(), Some("km/h"));
    assert_eq!(row.signal("Gear").unwrap().label(), Some("Drive"));
}

#[test]
fn test_signed_motorola_and_overlapping_signals() {
    init_logging();
    let mut analyzer = Analyzer::default();
    analyzer
        .import_definitions_str(Path::new("climate.dbc"), CLIMATE_DBC)
        .unwrap();
    let log = asc_log(&[
        "   0.010000 1  400  Rx   d 4 FF 00 34 12",
        "   0.020000 1  400  Rx   d 4 19 00 FF 00",
    ]);
    let dataset = analyzer.import_log(log.path()).unwrap();

    let row = dataset.record_at(0).unwrap();
    let temp = row.signal("T").unwrap();
    assert_eq!(temp.raw, -16);
    assert_eq!(temp.physical, -48.0);
    assert_eq!(temp.unit(), Some("degC"));
    assert_eq!(row.signal("Word").unwrap().raw, 0x1234);
    assert_eq!(row.signal("LowByte").unwrap().raw, 0x34);

    let row = dataset.record_at(1).unwrap();
    assert_eq!(row.signal("T").unwrap().physical, 160.0);
    assert_eq!(row.signal("Word").unwrap().raw, 0xFF);
    assert_eq!(row.signal("LowByte").unwrap().raw, 0xFF);
}

#[test]
fn test_switching_database_keeps_raw_fields() {
    init_logging();
    let mut analyzer = Analyzer::default();
    analyzer
        .import_definitions_str(Path::new("vehicle.dbc"), VEHICLE_DBC)
        .unwrap();
    let raw_id = analyzer
        .import_definitions_str(Path::new("vehicle_raw.dbc"), VEHICLE_RAW_DBC)
        .unwrap();

    let lines: Vec<String> = (0..200)
        .map(|i| format!("   {:.6} 1  123  Rx   d 8 {:02X} 01 00 00 00 00 00 00", i as f64 * 0.01, i % 256))
        .collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let log = asc_log(&lines);
    let dataset = analyzer.import_log(log.path()).unwrap();
    let before: Vec<LogRecord> = dataset.records().to_vec();
    let scaled = dataset.record_at(5).unwrap().signal("Speed").unwrap().physical;

    analyzer.set_active_database(&raw_id).unwrap();
    assert_eq!(dataset.state(), DatasetState::Ready);
    assert_eq!(dataset.spawn_redecode().wait().unwrap(), DecodeOutcome::Completed);
    assert_eq!(dataset.state(), DatasetState::Decoded);

    assert_eq!(dataset.records(), &before[..]);
    let raw = dataset.record_at(5).unwrap().signal("Speed").unwrap().physical;
    assert_eq!(raw, 0x0105 as f64);
    assert!((scaled - 26.1).abs() < 1e-9);
    assert!(dataset.record_at(5).unwrap().signal("Gear").is_none());
}

#[test]
fn test_latest_redecode_wins() {
    init_logging();
    let mut analyzer = Analyzer::new(AnalyzerConfig::default().with_decode_batch_size(1));
    analyzer
        .import_definitions_str(Path::new("vehicle.dbc"), VEHICLE_DBC)
        .unwrap();
    let raw_id = analyzer
        .import_definitions_str(Path::new("vehicle_raw.dbc"), VEHICLE_RAW_DBC)
        .unwrap();
    let lines: Vec<String> = (0..2000)
        .map(|i| format!("   {:.6} 1  123  Rx   d 2 10 27", i as f64 * 0.001))
        .collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let log = asc_log(&lines);
    let dataset = analyzer.import_log(log.path()).unwrap();

    analyzer.set_active_database(&raw_id).unwrap();
    let first = dataset.spawn_redecode();
    let second = dataset.redecode(&can_log_core::CancelToken::new());
    let first = first.wait().unwrap();

    // Whichever pass started last is installed; the other may be discarded
    assert!(first == DecodeOutcome::Completed || second == DecodeOutcome::Completed);
    assert_ne!(first, DecodeOutcome::Cancelled);
    assert_ne!(second, DecodeOutcome::Cancelled);
    assert_eq!(dataset.record_at(0).unwrap().signal("Speed").unwrap().physical, 10000.0);
    assert_eq!(dataset.state(), DatasetState::Decoded);
}

#[test]
fn test_blf_truncated_object() {
    init_logging();
    let mut bytes = blf_header(3);
    bytes.extend(blf_can_message(1_000_000, 0x123, &[0x10, 0x27]));
    bytes.extend(blf_can_message(2_000_000, 0x124, &[1, 2, 3]));
    let last = blf_can_message(3_000_000, 0x125, &[4, 5, 6, 7]);
    bytes.extend(&last[..last.len() / 2]);
    let file = binary_file(&bytes);

    let dataset = Analyzer::default().import_log(file.path()).unwrap();
    assert_eq!(dataset.record_count(), 2);
    let parse = &dataset.summary().sources[0].parse;
    assert!(parse.truncated);
    assert_eq!(parse.declared_objects, Some(3));
    assert!(parse
        .warnings
        .iter()
        .any(|w| w.kind == ParseWarningKind::TruncatedObject));
    assert!((dataset.record(1).unwrap().frame.timestamp - 0.002).abs() < 1e-12);
}

#[test]
fn test_unknown_magic_fails() {
    let file = binary_file(&[0xFE, 0xED, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04]);
    let result = Analyzer::default().import_log(file.path());
    assert!(matches!(result, Err(AnalyzerError::Format(_))));
}

#[test]
fn test_missing_file_fails_with_io() {
    let result = Analyzer::default().import_log(Path::new("/nonexistent/trace.blf"));
    assert!(matches!(result, Err(AnalyzerError::Io { .. })));
}

#[test]
fn test_concatenated_sources() {
    let asc = asc_log(&["   0.010000 1  100  Rx   d 1 01", "   0.020000 1  101  Rx   d 1 02"]);
    let mut bytes = blf_header(1);
    bytes.extend(blf_can_message(5_000_000, 0x200, &[3]));
    let blf = binary_file(&bytes);

    let paths: Vec<PathBuf> = vec![asc.path().to_path_buf(), blf.path().to_path_buf()];
    let handle = Analyzer::default().spawn_import(paths);
    let dataset = handle.wait().unwrap();

    assert_eq!(dataset.record_count(), 3);
    let sources = &dataset.summary().sources;
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].first_sequence, 2);
    assert_eq!(dataset.record(2).unwrap().sequence, 2);
    assert_eq!(dataset.summary().identifiers.len(), 3);
}

#[test]
fn test_partially_broken_definitions() {
    let broken = format!(
        "{}\nBO_ 512 Broken: 8 ECU\n SG_ Bad : 0|16@1+ (1,0) [0|1] \"\" Vector__XXX garbage ((\n",
        VEHICLE_RAW_DBC
    );
    let file = text_file(&broken);
    let mut analyzer = Analyzer::default();
    let id = analyzer.import_definitions(file.path()).unwrap();
    let db = analyzer.database(&id).unwrap();
    assert!(db.lookup(0x123).is_some());
    assert!(!db.warnings().is_empty());
}
