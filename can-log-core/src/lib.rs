//! CAN Log Analyzer Library
//!
//! Ingests CAN bus logs (Vector ASC text logs, BLF binary logs), decodes
//! signal values with DBC definitions databases and serves the result as
//! indexed, randomly accessible datasets with filtered, windowed views.
//!
//! # Architecture
//!
//! - Format parsers produce a lazy stream of raw frames plus a parse summary
//! - Any number of definitions databases can be loaded; exactly zero or one
//!   is active and only the active one is used for decoding
//! - A dataset owns the imported records and never modifies them; decoded
//!   signals live in a separate layer that is rebuilt on re-decode
//! - Filters are evaluated against the dataset without copying records, and
//!   rows are only materialized for the window a consumer asks for
//!
//! The library does NOT:
//! - Capture from or transmit on a live bus
//! - Render plots or tables
//! - Export decoded rows to files
//!
//! Presentation lives in the application layer (can-log-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_log_core::{Analyzer, AnalyzerConfig, FilterSpec};
//! use std::path::Path;
//!
//! let mut analyzer = Analyzer::new(AnalyzerConfig::default());
//! analyzer.import_definitions(Path::new("powertrain.dbc")).unwrap();
//!
//! let dataset = analyzer.import_log(Path::new("trace.asc")).unwrap();
//! println!("{} records", dataset.record_count());
//!
//! let filter = FilterSpec::new()
//!     .include_ids([0x123, 0x456])
//!     .with_time_range(10.0, 20.0);
//! let handle = dataset.filter(&filter);
//!
//! for row in dataset.window(&handle, 0, 100) {
//!     for signal in row.readings() {
//!         println!("{:.6} {}", row.frame().timestamp, signal);
//!     }
//! }
//! ```

// Public modules
pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod formats;
pub mod import;
pub mod message_decoder;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use analyzer::Analyzer;
pub use config::{AnalyzerConfig, TimeResolution};
pub use dataset::{
    extract_series, find_next, find_previous, Dataset, DatasetBuilder, DatasetId, DatasetState,
    DatasetSummary, DecodeOutcome, FilterHandle, FilterSpec, IdFilter, IdFilterMode, SearchHit,
    SearchQuery, SignalSeries, SourceSummary,
};
pub use formats::{detect_format, open_log, open_log_as, FrameSource, LogFormat, ParseSummary};
pub use import::{CancelToken, DecodeHandle, ImportHandle};
pub use message_decoder::MessageDecoder;
pub use signals::{
    DatabaseId, DatabaseInfo, DatabaseRegistry, DatabaseStats, DefinitionsDatabase, MessageDefinition,
    SignalDefinition,
};
pub use types::{
    AnalyzerError, CanFrame, DecodedMessage, DefinitionWarning, Direction, LogRecord, ParseWarning,
    ParseWarningKind, Payload, RecordView, Result, SignalReading,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_analyzer_creation() {
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        assert!(analyzer.databases().is_empty());
        assert!(analyzer.active_database().is_none());
    }
}
