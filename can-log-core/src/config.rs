//! Analyzer configuration types
//!
//! Tuning knobs for the parsers, the filter index and the background workers.
//! Every field has a serde default so a partial `[core]` table in a
//! configuration file is enough.

use serde::{Deserialize, Serialize};

/// Tick resolution of a BLF object timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeResolution {
    /// 10 µs ticks
    TenMicroseconds,
    /// 1 ns ticks
    Nanoseconds,
}

impl TimeResolution {
    pub fn ticks_to_seconds(self, ticks: u64) -> f64 {
        match self {
            // Split so whole seconds stay exact for large tick counts
            TimeResolution::TenMicroseconds => {
                (ticks / 100_000) as f64 + (ticks % 100_000) as f64 / 100_000.0
            }
            TimeResolution::Nanoseconds => {
                (ticks / 1_000_000_000) as f64 + (ticks % 1_000_000_000) as f64 / 1_000_000_000.0
            }
        }
    }
}

/// Configuration for the analyzer library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Decode signals with the active database as part of an import
    #[serde(default = "default_true")]
    pub decode_on_import: bool,

    /// Records per block of a filter index
    #[serde(default = "default_filter_block_size")]
    pub filter_block_size: usize,

    /// Records decoded between cancellation checks of a re-decode pass
    #[serde(default = "default_decode_batch_size")]
    pub decode_batch_size: usize,

    /// Records parsed between updates of the import progress counter
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// How far to scan for the next object after a corrupted BLF object
    #[serde(default = "default_blf_max_resync_bytes")]
    pub blf_max_resync_bytes: usize,

    /// Resolution for BLF objects whose time flags name no resolution
    #[serde(default = "default_blf_resolution")]
    pub blf_default_resolution: TimeResolution,
}

fn default_true() -> bool {
    true
}

fn default_filter_block_size() -> usize {
    1024
}

fn default_decode_batch_size() -> usize {
    4096
}

fn default_progress_interval() -> usize {
    1024
}

fn default_blf_max_resync_bytes() -> usize {
    64 * 1024
}

fn default_blf_resolution() -> TimeResolution {
    TimeResolution::Nanoseconds
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            decode_on_import: default_true(),
            filter_block_size: default_filter_block_size(),
            decode_batch_size: default_decode_batch_size(),
            progress_interval: default_progress_interval(),
            blf_max_resync_bytes: default_blf_max_resync_bytes(),
            blf_default_resolution: default_blf_resolution(),
        }
    }
}

impl AnalyzerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable decoding during import
    pub fn with_decode_on_import(mut self, enabled: bool) -> Self {
        self.decode_on_import = enabled;
        self
    }

    /// Builder method: set the filter index block size (at least 1)
    pub fn with_filter_block_size(mut self, records: usize) -> Self {
        self.filter_block_size = records.max(1);
        self
    }

    /// Builder method: set the re-decode batch size (at least 1)
    pub fn with_decode_batch_size(mut self, records: usize) -> Self {
        self.decode_batch_size = records.max(1);
        self
    }

    /// Builder method: set the import progress interval (at least 1)
    pub fn with_progress_interval(mut self, records: usize) -> Self {
        self.progress_interval = records.max(1);
        self
    }

    /// Builder method: set the BLF resync window
    pub fn with_blf_max_resync_bytes(mut self, bytes: usize) -> Self {
        self.blf_max_resync_bytes = bytes;
        self
    }

    /// Builder method: set the fallback BLF timestamp resolution
    pub fn with_blf_default_resolution(mut self, resolution: TimeResolution) -> Self {
        self.blf_default_resolution = resolution;
        self
    }

    /// Sizes clamped to usable values (a zero from a config file means 1)
    pub(crate) fn block_size(&self) -> usize {
        self.filter_block_size.max(1)
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.decode_batch_size.max(1)
    }

    pub(crate) fn progress_step(&self) -> usize {
        self.progress_interval.max(1)
    }
}
