//! Standalone CAN log inspection tool
//!
//! Imports ASC/BLF log files, decodes them with DBC definitions and prints
//! a per-identifier breakdown of the dataset.
//!
//! Usage:
//!   inspect_log <log_file> [<log_file> ...] [--dbc <file.dbc>] [--top <count>]
//!
//! Example:
//!   inspect_log trace.blf --dbc powertrain.dbc --top 20

use can_log_core::{Analyzer, AnalyzerConfig, Dataset, FilterSpec};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

struct IdStats {
    frames: usize,
    name: Option<String>,
    signals: usize,
}

fn collect(dataset: &Dataset) -> HashMap<u32, IdStats> {
    let mut stats: HashMap<u32, IdStats> = HashMap::new();
    let all = dataset.filter(&FilterSpec::new());
    for index in dataset.filtered_indices(&all) {
        let Some(row) = dataset.record_at(index) else {
            continue;
        };
        let entry = stats.entry(row.frame().can_id).or_insert(IdStats {
            frames: 0,
            name: None,
            signals: 0,
        });
        entry.frames += 1;
        if entry.name.is_none() {
            entry.name = row.message_name().map(str::to_string);
        }
        entry.signals += row.readings().count();
    }
    stats
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut logs = Vec::new();
    let mut dbcs = Vec::new();
    let mut top = 10usize;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dbc" => dbcs.extend(args.next().map(PathBuf::from)),
            "--top" => top = args.next().and_then(|v| v.parse().ok()).unwrap_or(top),
            _ => logs.push(PathBuf::from(arg)),
        }
    }
    if logs.is_empty() {
        eprintln!("Usage: inspect_log <log_file> [...] [--dbc <file.dbc>] [--top <count>]");
        std::process::exit(1);
    }

    let mut analyzer = Analyzer::new(AnalyzerConfig::default());
    for dbc in &dbcs {
        if let Err(e) = analyzer.import_definitions(dbc) {
            eprintln!("Error loading DBC {:?}: {}", dbc, e);
            std::process::exit(1);
        }
    }

    let dataset = match analyzer.import_logs(&logs) {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("Import failed: {}", e);
            std::process::exit(1);
        }
    };

    let summary = dataset.summary();
    println!("\n=== DATASET SUMMARY ===");
    println!("Records: {}", summary.record_count);
    println!("Duration: {:.3} s", summary.duration());
    println!("Unique CAN IDs: {}", summary.identifiers.len());
    println!("Parse warnings: {}", summary.warning_count());

    let stats = collect(&dataset);
    let mut sorted: Vec<_> = stats.iter().collect();
    sorted.sort_by(|a, b| b.1.frames.cmp(&a.1.frames));

    println!("\nTop {} identifiers:", top);
    for (id, s) in sorted.into_iter().take(top) {
        println!(
            "  0x{:03X} {:<24} {:>8} frames {:>10} signal values",
            id,
            s.name.as_deref().unwrap_or("-"),
            s.frames,
            s.signals
        );
    }
}
