//! Log file format parsers (ASC, BLF)
//!
//! This module contains parsers for the supported CAN log file formats.
//! Each parser is an iterator over [`CanFrame`] objects that collects a
//! [`ParseSummary`] (counts, time span, identifiers, warnings) as it goes.
//! The format is chosen from the first bytes of the file through a static
//! signature table; the file extension is never consulted.

use crate::config::AnalyzerConfig;
use crate::types::{AnalyzerError, CanFrame, ParseWarning, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub mod asc;
pub mod blf;

pub use asc::AscReader;
pub use blf::BlfReader;

/// Bytes read from the head of a file for format detection
pub const SNIFF_LEN: usize = 512;

/// Supported log file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Vector ASCII trace
    Asc,
    /// Vector binary logging format
    Blf,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Asc => write!(f, "ASC"),
            LogFormat::Blf => write!(f, "BLF"),
        }
    }
}

type SignatureFn = fn(&[u8]) -> bool;

/// Detection order matters: binary signatures come before the text heuristic
const SIGNATURES: &[(LogFormat, SignatureFn)] = &[
    (LogFormat::Blf, blf::has_signature),
    (LogFormat::Asc, asc::has_signature),
];

/// Pick a parser from the first bytes of a file
pub fn detect_format(prefix: &[u8]) -> Option<LogFormat> {
    SIGNATURES
        .iter()
        .find(|(_, matches)| matches(prefix))
        .map(|(format, _)| *format)
}

/// A parser producing raw frames
///
/// The summary grows while frames are pulled and is final once the iterator
/// has returned `None`.
pub trait FrameSource: Iterator<Item = CanFrame> + Send {
    fn format(&self) -> LogFormat;

    fn summary(&self) -> &ParseSummary;
}

/// Terminal statistics of one parse
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseSummary {
    pub frame_count: u64,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub min_timestamp: Option<f64>,
    pub max_timestamp: Option<f64>,
    /// Distinct CAN identifiers seen
    pub identifiers: BTreeSet<u32>,
    pub warnings: Vec<ParseWarning>,
    /// Recognised events that are not data frames (error frames, remote frames, statistics)
    pub skipped_events: u64,
    /// Frames whose timestamp is lower than the previous frame's
    pub timestamp_regressions: u64,
    /// Absolute start of the measurement, when the file records it
    pub start_time: Option<NaiveDateTime>,
    /// Object count declared by a BLF file header
    pub declared_objects: Option<u32>,
    /// Parsing stopped at a truncated object
    pub truncated: bool,
}

impl ParseSummary {
    pub(crate) fn record(&mut self, frame: &CanFrame) {
        let ts = frame.timestamp;
        if let Some(last) = self.last_timestamp {
            if ts < last {
                self.timestamp_regressions += 1;
                log::debug!("Timestamp went backwards: {:.6} after {:.6}", ts, last);
            }
        }
        self.frame_count += 1;
        self.first_timestamp.get_or_insert(ts);
        self.last_timestamp = Some(ts);
        self.min_timestamp = Some(self.min_timestamp.map_or(ts, |m| m.min(ts)));
        self.max_timestamp = Some(self.max_timestamp.map_or(ts, |m| m.max(ts)));
        self.identifiers.insert(frame.can_id);
    }

    pub(crate) fn warn(&mut self, warning: ParseWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// `(min, max)` timestamp, if any frame was read
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((self.min_timestamp?, self.max_timestamp?))
    }

    pub fn duration(&self) -> f64 {
        self.time_span().map_or(0.0, |(lo, hi)| hi - lo)
    }
}

/// Open a log file, choosing the parser from its leading bytes
pub fn open_log(path: &Path, config: &AnalyzerConfig) -> Result<Box<dyn FrameSource>> {
    let mut file = File::open(path).map_err(|e| AnalyzerError::io(path, e))?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    (&mut file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| AnalyzerError::io(path, e))?;

    let format = detect_format(&prefix).ok_or_else(|| {
        AnalyzerError::Format(format!("{:?} is neither a BLF nor an ASC log", path))
    })?;
    log::debug!("Detected {} format for {:?}", format, path);

    open_log_as(path, format, config)
}

/// Open a log file with an explicit parser
pub fn open_log_as(path: &Path, format: LogFormat, config: &AnalyzerConfig) -> Result<Box<dyn FrameSource>> {
    match format {
        LogFormat::Asc => Ok(Box::new(AscReader::open(path)?)),
        LogFormat::Blf => Ok(Box::new(BlfReader::open(path, config)?)),
    }
}
