//! CAN Log Analyzer CLI Application
//!
//! This is the command-line interface for the CAN log analyzer.
//! It uses the can-log-core library and adds:
//! - TOML configuration with command-line overrides
//! - Filtered, windowed listings of decoded records
//! - Search and signal series extraction
//! - Text and JSON reports

use anyhow::{bail, Context, Result};
use can_log_core::dataset::parse_can_id;
use can_log_core::{
    extract_series, find_next, Analyzer, Dataset, FilterHandle, FilterSpec, IdFilter, SearchQuery,
};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

mod config;
mod report;

use config::{AppConfig, OutputFormat};
use report::{Report, RowReport, SearchReport};

/// CAN Log Analyzer - Import, decode and browse CAN log files
#[derive(Parser, Debug)]
#[command(name = "can-log-cli")]
#[command(about = "Import, decode and browse CAN log files (ASC, BLF)", long_about = None)]
#[command(version)]
struct Args {
    /// Path to ASC/BLF log file (can be repeated; files are concatenated)
    #[arg(short, long, value_name = "FILE")]
    log: Vec<PathBuf>,

    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Id of the database to activate (file stem; default: first loaded)
    #[arg(long, value_name = "ID")]
    active: Option<String>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep only these identifiers (hex, comma separated)
    #[arg(long, value_name = "IDS", value_parser = parse_id_list, conflicts_with = "exclude_id")]
    id: Option<IdList>,

    /// Drop these identifiers (hex, comma separated)
    #[arg(long, value_name = "IDS", value_parser = parse_id_list)]
    exclude_id: Option<IdList>,

    /// Keep only received frames
    #[arg(long, conflicts_with = "tx_only")]
    rx_only: bool,

    /// Keep only transmitted frames
    #[arg(long)]
    tx_only: bool,

    /// Time range in seconds, LO:HI (inclusive)
    #[arg(long, value_name = "LO:HI", value_parser = parse_time_range)]
    time: Option<(f64, f64)>,

    /// Data length range, LO:HI (inclusive)
    #[arg(long, value_name = "LO:HI", value_parser = parse_dlc_range)]
    dlc: Option<(u8, u8)>,

    /// Rows to print, START:LEN over the filtered view
    #[arg(long, value_name = "START:LEN", value_parser = parse_window)]
    window: Option<(usize, usize)>,

    /// Find the first record with this identifier (hex)
    #[arg(long, value_name = "ID")]
    search_id: Option<String>,

    /// Find the first record whose payload contains these hex bytes
    #[arg(long, value_name = "HEX")]
    search_data: Option<String>,

    /// Find the first record with a decoded signal matching `name:value`
    #[arg(long, value_name = "TEXT")]
    search_signal: Option<String>,

    /// Case-sensitive data/signal search
    #[arg(long)]
    case_sensitive: bool,

    /// Signal search matches whole words only
    #[arg(long)]
    whole_word: bool,

    /// Extract the time series of this signal over the filtered view
    #[arg(long, value_name = "NAME")]
    signal: Option<String>,

    /// Restrict --signal to one identifier (hex)
    #[arg(long, value_name = "ID", requires = "signal", value_parser = parse_hex_id)]
    signal_id: Option<u32>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Log Analyzer CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using analyzer library v{}", can_log_core::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    if config.input.logs.is_empty() && config.input.definitions.is_empty() {
        println!("CAN Log Analyzer - No input specified");
        println!("\nQuick Start:");
        println!("  can-log-cli --log trace.blf --dbc signals.dbc");
        println!("  can-log-cli --log trace.asc --id 0x123,0x456 --window 0:100");
        println!("\nWith a configuration file:");
        println!("  can-log-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    run(&config, &args)
}

/// Load definitions, import logs, print the requested report
fn run(config: &AppConfig, args: &Args) -> Result<()> {
    let mut analyzer = Analyzer::new(config.core.clone());

    for path in &config.input.definitions {
        analyzer
            .import_definitions(path)
            .with_context(|| format!("Failed to load DBC file: {:?}", path))?;
    }
    if let Some(active) = &config.input.active {
        analyzer
            .set_active_database(active)
            .with_context(|| format!("Cannot activate database {:?}", active))?;
    }

    let databases = analyzer.databases();
    let dataset = if config.input.logs.is_empty() {
        None
    } else {
        Some(import(&analyzer, config.input.logs.clone())?)
    };

    let Some(dataset) = dataset else {
        for db in &databases {
            println!(
                "{} {}: {} messages, {} signals, {} warnings",
                if db.active { "*" } else { " " },
                db.id,
                db.message_count,
                db.signal_count,
                db.warning_count
            );
        }
        return Ok(());
    };

    let handle = dataset.filter(&config.filter);
    let report = build_report(&dataset, &handle, databases, config, args)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match config.output.format {
        OutputFormat::Txt => report::write_text(&mut out, &report),
        OutputFormat::Json => report::write_json(&mut out, &report),
    }
}

/// Import on a worker thread, logging progress while it runs
fn import(analyzer: &Analyzer, logs: Vec<PathBuf>) -> Result<std::sync::Arc<Dataset>> {
    let handle = analyzer.spawn_import(logs);
    let mut reported = 0;
    while !handle.is_finished() {
        let available = handle.records_available();
        if available != reported {
            log::debug!("{} records parsed", available);
            reported = available;
        }
        thread::sleep(Duration::from_millis(100));
    }
    handle.wait().context("Import failed")
}

fn build_report<'a>(
    dataset: &'a Dataset,
    handle: &FilterHandle,
    databases: Vec<can_log_core::DatabaseInfo>,
    config: &AppConfig,
    args: &Args,
) -> Result<Report<'a>> {
    let start = config.output.window_start;
    let rows = dataset
        .window(handle, start, config.output.window_len)
        .iter()
        .map(RowReport::from_view)
        .collect();

    let search = match search_query(args)? {
        Some(query) => match find_next(dataset, handle, &query, None) {
            Some(hit) => SearchReport::new(dataset, hit),
            None => {
                log::info!("No record matches {:?}", query);
                None
            }
        },
        None => None,
    };

    let series = args
        .signal
        .as_deref()
        .and_then(|name| extract_series(dataset, handle, args.signal_id, name));
    if args.signal.is_some() && series.is_none() {
        log::warn!("Signal {:?} not found in the filtered records", args.signal);
    }

    Ok(Report {
        databases,
        summary: dataset.summary(),
        filter: config.filter.to_string(),
        filtered_count: dataset.count_filtered(handle),
        window_start: start,
        rows,
        search,
        series,
    })
}

fn search_query(args: &Args) -> Result<Option<SearchQuery>> {
    if let Some(id) = &args.search_id {
        return match SearchQuery::can_id(id) {
            Some(query) => Ok(Some(query)),
            None => bail!("Invalid CAN ID: {}", id),
        };
    }
    if let Some(pattern) = &args.search_data {
        return Ok(Some(SearchQuery::data(pattern, args.case_sensitive)));
    }
    if let Some(text) = &args.search_signal {
        return Ok(Some(SearchQuery::signal(text, args.case_sensitive, args.whole_word)));
    }
    Ok(None)
}

/// Command-line flags win over the configuration file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if !args.log.is_empty() {
        config.input.logs = args.log.clone();
    }
    if !args.dbc.is_empty() {
        config.input.definitions = args.dbc.clone();
    }
    if args.active.is_some() {
        config.input.active = args.active.clone();
    }

    let filter: &mut FilterSpec = &mut config.filter;
    if let Some(IdList(ids)) = &args.id {
        filter.ids = Some(IdFilter::include(ids.iter().copied()));
    }
    if let Some(IdList(ids)) = &args.exclude_id {
        filter.ids = Some(IdFilter::exclude(ids.iter().copied()));
    }
    if args.rx_only || args.tx_only {
        *filter = filter.clone().with_directions(args.rx_only, args.tx_only);
    }
    if let Some((lo, hi)) = args.time {
        filter.time_range = Some((lo, hi));
    }
    if let Some((lo, hi)) = args.dlc {
        filter.dlc_range = Some((lo, hi));
    }

    if let Some((start, len)) = args.window {
        config.output.window_start = start;
        config.output.window_len = len;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
}

fn parse_hex_id(text: &str) -> Result<u32, String> {
    parse_can_id(text).ok_or_else(|| format!("invalid CAN ID `{}`", text))
}

/// Comma separated identifiers of `--id` / `--exclude-id`
#[derive(Debug, Clone, PartialEq, Eq)]
struct IdList(Vec<u32>);

fn parse_id_list(text: &str) -> Result<IdList, String> {
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_hex_id)
        .collect::<Result<Vec<_>, _>>()
        .map(IdList)
}

fn split_pair(text: &str) -> Result<(&str, &str), String> {
    text.split_once(':')
        .ok_or_else(|| format!("expected LO:HI, got `{}`", text))
}

fn parse_time_range(text: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = split_pair(text)?;
    let lo: f64 = lo.trim().parse().map_err(|e| format!("{}: {}", lo, e))?;
    let hi: f64 = hi.trim().parse().map_err(|e| format!("{}: {}", hi, e))?;
    Ok((lo.min(hi), lo.max(hi)))
}

fn parse_dlc_range(text: &str) -> Result<(u8, u8), String> {
    let (lo, hi) = split_pair(text)?;
    let lo: u8 = lo.trim().parse().map_err(|e| format!("{}: {}", lo, e))?;
    let hi: u8 = hi.trim().parse().map_err(|e| format!("{}: {}", hi, e))?;
    Ok((lo.min(hi), lo.max(hi)))
}

fn parse_window(text: &str) -> Result<(usize, usize), String> {
    let (start, len) = split_pair(text)?;
    let start = start.trim().parse().map_err(|e| format!("{}: {}", start, e))?;
    let len = len.trim().parse().map_err(|e| format!("{}: {}", len, e))?;
    Ok((start, len))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_id_list("0x123, 456,"), Ok(IdList(vec![0x123, 0x456])));
        assert!(parse_id_list("0x123,zz").is_err());
        assert_eq!(parse_time_range("2.5:1"), Ok((1.0, 2.5)));
        assert_eq!(parse_dlc_range("0:8"), Ok((0, 8)));
        assert_eq!(parse_window("100:50"), Ok((100, 50)));
        assert!(parse_window("100").is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = Args::parse_from([
            "can-log-cli",
            "--log",
            "a.asc",
            "--id",
            "0x100,0x200",
            "--tx-only",
            "--time",
            "1:2",
            "--window",
            "10:5",
            "--format",
            "json",
        ]);
        let mut config = AppConfig::default();
        config.input.logs = vec![PathBuf::from("from_config.blf")];
        apply_overrides(&mut config, &args);

        assert_eq!(config.input.logs, vec![PathBuf::from("a.asc")]);
        assert_eq!(config.filter.ids, Some(IdFilter::include([0x100, 0x200])));
        let dirs = config.filter.directions.unwrap();
        assert!(dirs.tx && !dirs.rx);
        assert_eq!(config.filter.time_range, Some((1.0, 2.0)));
        assert_eq!((config.output.window_start, config.output.window_len), (10, 5));
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_search_query_from_args() {
        let args = Args::parse_from(["can-log-cli", "--search-id", "0x7E8"]);
        assert_eq!(search_query(&args).unwrap(), Some(SearchQuery::CanId(0x7E8)));
        let args = Args::parse_from(["can-log-cli", "--search-id", "xyz"]);
        assert!(search_query(&args).is_err());
    }
}
