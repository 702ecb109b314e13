//! Datasets of imported log records
//!
//! A [`Dataset`] owns the ordered records of one import (one or several log
//! files) and never changes them afterwards. Decoded signals live beside the
//! records in a decode layer: one write-once slot per record, filled lazily
//! on access or in bulk by a re-decode pass. A pass builds a fresh layer and
//! swaps it in when finished, so readers always see one consistent layer and
//! raw record fields are never touched.

use crate::config::AnalyzerConfig;
use crate::formats::{LogFormat, ParseSummary};
use crate::import::{CancelToken, DecodeHandle};
use crate::message_decoder::MessageDecoder;
use crate::signals::database::DefinitionsDatabase;
use crate::signals::registry::{ActiveSelection, SelectionSnapshot};
use crate::types::{CanFrame, DecodedMessage, Direction, LogRecord, RecordView};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

pub mod filter;
pub mod search;
pub mod series;
pub mod view;

pub use filter::{CompiledFilter, DirectionSet, FilterSpec, IdFilter, IdFilterMode};
pub use search::{find_next, find_previous, parse_can_id, SearchHit, SearchQuery};
pub use series::{extract_series, SignalSeries};
pub use view::{FilterHandle, FilteredIndices};

/// Identity of a dataset, unique within the process
pub type DatasetId = u64;

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a dataset or of an import producing one
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetState {
    /// Import not started
    Empty,
    /// Parser running
    Loading { records_available: u64 },
    /// Records available, signals stale or not decoded
    Ready,
    /// Signals decoded under the current active database
    Decoded,
    /// Import failed; a new import may be started
    Failed(String),
}

/// Result of a re-decode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Completed,
    /// A newer pass started; this one was discarded
    Superseded,
    Cancelled,
}

/// Parse statistics of one source file in a dataset
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub path: PathBuf,
    pub format: LogFormat,
    /// Sequence index of the first record taken from this source
    pub first_sequence: u64,
    pub parse: ParseSummary,
}

/// Derived statistics of a dataset
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetSummary {
    pub record_count: u64,
    pub identifiers: BTreeSet<u32>,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub min_timestamp: Option<f64>,
    pub max_timestamp: Option<f64>,
    pub rx_count: u64,
    pub tx_count: u64,
    pub start_time: Option<NaiveDateTime>,
    pub sources: Vec<SourceSummary>,
}

impl DatasetSummary {
    pub fn duration(&self) -> f64 {
        match (self.min_timestamp, self.max_timestamp) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0,
        }
    }

    pub fn warning_count(&self) -> usize {
        self.sources.iter().map(|s| s.parse.warnings.len()).sum()
    }

    fn record(&mut self, frame: &CanFrame) {
        let ts = frame.timestamp;
        self.record_count += 1;
        self.identifiers.insert(frame.can_id);
        self.first_timestamp.get_or_insert(ts);
        self.last_timestamp = Some(ts);
        self.min_timestamp = Some(self.min_timestamp.map_or(ts, |m| m.min(ts)));
        self.max_timestamp = Some(self.max_timestamp.map_or(ts, |m| m.max(ts)));
        match frame.direction {
            Direction::Rx => self.rx_count += 1,
            Direction::Tx => self.tx_count += 1,
        }
    }
}

/// Signals decoded for every record under one database
#[derive(Debug)]
struct DecodeLayer {
    pass: u64,
    selection_generation: u64,
    database: Option<Arc<DefinitionsDatabase>>,
    slots: Vec<OnceLock<Option<Arc<DecodedMessage>>>>,
    populated: AtomicUsize,
}

impl DecodeLayer {
    fn new(pass: u64, snapshot: SelectionSnapshot, records: usize) -> Self {
        // No database, nothing to hold
        let slots = match snapshot.database {
            Some(_) => (0..records).map(|_| OnceLock::new()).collect(),
            None => Vec::new(),
        };
        Self {
            pass,
            selection_generation: snapshot.generation,
            database: snapshot.database,
            slots,
            populated: AtomicUsize::new(0),
        }
    }

    /// Decoded signals of record `index`, decoding on first access
    fn resolve(&self, index: usize, frame: &CanFrame) -> Option<Arc<DecodedMessage>> {
        let database = self.database.as_ref()?;
        let slot = self.slots.get(index)?;
        let mut filled = false;
        let value = slot.get_or_init(|| {
            filled = true;
            MessageDecoder::decode(database, frame).map(Arc::new)
        });
        if filled {
            self.populated.fetch_add(1, Ordering::Relaxed);
        }
        value.clone()
    }

    fn is_complete(&self) -> bool {
        self.populated.load(Ordering::Relaxed) == self.slots.len()
    }
}

/// The records of one import plus their decoded signals
#[derive(Debug)]
pub struct Dataset {
    id: DatasetId,
    records: Vec<LogRecord>,
    summary: DatasetSummary,
    selection: Option<Arc<ActiveSelection>>,
    layer: RwLock<Arc<DecodeLayer>>,
    latest_pass: AtomicU64,
    config: AnalyzerConfig,
}

impl Dataset {
    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn summary(&self) -> &DatasetSummary {
        &self.summary
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw records in origin order
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&LogRecord> {
        self.records.get(index)
    }

    /// Record `index` with its decoded signals.
    ///
    /// Signals come from the installed decode layer and are decoded on first
    /// access. After an active-database switch they stay those of the previous
    /// database until [`Dataset::redecode`] runs.
    pub fn record_at(&self, index: usize) -> Option<RecordView<'_>> {
        let record = self.records.get(index)?;
        let layer = self.current_layer();
        Some(RecordView {
            record,
            signals: layer.resolve(index, &record.frame),
        })
    }

    pub fn state(&self) -> DatasetState {
        let layer = self.current_layer();
        let current = self.selection.as_ref().map_or(0, |s| s.generation());
        if layer.database.is_some() && layer.selection_generation == current && layer.is_complete() {
            DatasetState::Decoded
        } else {
            DatasetState::Ready
        }
    }

    /// Name of the database the installed signals were decoded with
    pub fn decoded_with(&self) -> Option<PathBuf> {
        self.current_layer()
            .database
            .as_ref()
            .map(|db| db.source().to_path_buf())
    }

    /// Decode every record under the currently active database.
    ///
    /// The result replaces the installed signals only if no newer pass was
    /// started meanwhile. Cancellation and supersession are checked between
    /// batches of `decode_batch_size` records.
    pub fn redecode(&self, cancel: &CancelToken) -> DecodeOutcome {
        let pass = self.latest_pass.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.selection.as_ref().map(|s| s.snapshot()).unwrap_or_default();
        log::info!(
            "Decoding dataset {} ({} records) with {:?}",
            self.id,
            self.records.len(),
            snapshot.id
        );
        let layer = Arc::new(DecodeLayer::new(pass, snapshot, self.records.len()));

        if layer.database.is_some() {
            let batch = self.config.batch_size();
            for (batch_index, chunk) in self.records.chunks(batch).enumerate() {
                if cancel.is_cancelled() {
                    log::info!("Decode pass {} of dataset {} cancelled", pass, self.id);
                    return DecodeOutcome::Cancelled;
                }
                if self.latest_pass.load(Ordering::SeqCst) != pass {
                    log::debug!("Decode pass {} of dataset {} superseded", pass, self.id);
                    return DecodeOutcome::Superseded;
                }
                let base = batch_index * batch;
                chunk.par_iter().enumerate().for_each(|(offset, record)| {
                    layer.resolve(base + offset, &record.frame);
                });
            }
        }

        let mut installed = self.layer.write().unwrap_or_else(PoisonError::into_inner);
        if self.latest_pass.load(Ordering::SeqCst) != pass {
            log::debug!("Decode pass {} of dataset {} superseded", pass, self.id);
            return DecodeOutcome::Superseded;
        }
        log::debug!("Installed decode pass {} (replacing {})", layer.pass, installed.pass);
        *installed = layer;
        DecodeOutcome::Completed
    }

    /// Run [`Dataset::redecode`] on a worker thread
    pub fn spawn_redecode(self: &Arc<Self>) -> DecodeHandle {
        DecodeHandle::spawn(Arc::clone(self))
    }

    /// Build a filtered view. Records are neither copied nor moved.
    pub fn filter(&self, spec: &FilterSpec) -> FilterHandle {
        FilterHandle::build(self.id, &self.records, spec, self.config.block_size())
    }

    pub fn count_filtered(&self, handle: &FilterHandle) -> usize {
        if handle.belongs_to(self.id, self.records.len()) {
            handle.count()
        } else {
            0
        }
    }

    /// Record at filtered position `position`
    pub fn filtered_record_at(&self, handle: &FilterHandle, position: usize) -> Option<RecordView<'_>> {
        if !handle.belongs_to(self.id, self.records.len()) {
            return None;
        }
        let index = handle.position(&self.records, position)?;
        self.record_at(index)
    }

    /// Record index of filtered position `position`
    pub fn filtered_index(&self, handle: &FilterHandle, position: usize) -> Option<usize> {
        if !handle.belongs_to(self.id, self.records.len()) {
            return None;
        }
        handle.position(&self.records, position)
    }

    /// Lazy sequence of record indices passing the filter, in original order
    pub fn filtered_indices<'a>(&'a self, handle: &'a FilterHandle) -> FilteredIndices<'a> {
        self.filtered_indices_from(handle, 0)
    }

    /// Like [`Dataset::filtered_indices`], starting at filtered position `start`
    pub fn filtered_indices_from<'a>(&'a self, handle: &'a FilterHandle, start: usize) -> FilteredIndices<'a> {
        let start = if handle.belongs_to(self.id, self.records.len()) {
            start
        } else {
            handle.count()
        };
        handle.iter_from(&self.records, start)
    }

    /// Records at filtered positions `[start, start + len)`; only these are
    /// materialized.
    pub fn window(&self, handle: &FilterHandle, start: usize, len: usize) -> Vec<RecordView<'_>> {
        if !handle.belongs_to(self.id, self.records.len()) {
            return Vec::new();
        }
        let layer = self.current_layer();
        handle
            .iter_from(&self.records, start)
            .take(len)
            .map(|index| {
                let record = &self.records[index];
                RecordView {
                    record,
                    signals: layer.resolve(index, &record.frame),
                }
            })
            .collect()
    }

    fn current_layer(&self) -> Arc<DecodeLayer> {
        Arc::clone(&self.layer.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Collects records from one or more parsed sources
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    records: Vec<LogRecord>,
    summary: DatasetSummary,
    source_start: u64,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; sequence numbers continue across sources
    pub fn push(&mut self, frame: CanFrame) {
        self.summary.record(&frame);
        let sequence = self.records.len() as u64;
        self.records.push(LogRecord { sequence, frame });
    }

    /// Close the current source with its final parse summary
    pub fn finish_source(&mut self, path: &Path, format: LogFormat, parse: ParseSummary) {
        if self.summary.start_time.is_none() {
            self.summary.start_time = parse.start_time;
        }
        log::info!(
            "{} {:?}: {} frames, {} warnings, {} skipped events{}",
            format,
            path,
            parse.frame_count,
            parse.warnings.len(),
            parse.skipped_events,
            if parse.truncated { ", truncated" } else { "" }
        );
        self.summary.sources.push(SourceSummary {
            path: path.to_path_buf(),
            format,
            first_sequence: self.source_start,
            parse,
        });
        self.source_start = self.records.len() as u64;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Freeze the records under a fresh process-wide id. Signals are
    /// decoded lazily until a re-decode pass runs.
    pub fn build(self, selection: Option<Arc<ActiveSelection>>, config: AnalyzerConfig) -> Dataset {
        let id = NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed);
        let snapshot = selection.as_ref().map(|s| s.snapshot()).unwrap_or_default();
        let layer = DecodeLayer::new(0, snapshot, self.records.len());
        Dataset {
            id,
            records: self.records,
            summary: self.summary,
            selection,
            layer: RwLock::new(Arc::new(layer)),
            latest_pass: AtomicU64::new(0),
            config,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
    use crate::signals::registry::DatabaseRegistry;
    use crate::types::Payload;

    pub(crate) fn frame(ts: f64, id: u32, data: &[u8]) -> CanFrame {
        CanFrame {
            timestamp: ts,
            channel: 1,
            can_id: id,
            is_extended: false,
            is_fd: false,
            direction: Direction::Rx,
            payload: Payload::new(data),
        }
    }

    pub(crate) fn speed_database(name: &str, factor: f64) -> DefinitionsDatabase {
        let mut db = DefinitionsDatabase::new(format!("{}.dbc", name));
        let speed = SignalDefinition::new("Speed", 0, 16, ByteOrder::LittleEndian, ValueType::Unsigned)
            .unwrap()
            .with_scale(factor, 0.0)
            .with_unit("km/h");
        db.add_message(MessageDefinition::new(0x123, "Vehicle", 8).with_signal(speed));
        db
    }

    pub(crate) fn build(registry: &DatabaseRegistry, frames: Vec<CanFrame>) -> Dataset {
        let mut builder = DatasetBuilder::new();
        for f in frames {
            builder.push(f);
        }
        builder.build(Some(registry.selection()), AnalyzerConfig::default().with_decode_batch_size(2))
    }

    #[test]
    fn test_builder_numbers_and_summarises() {
        let registry = DatabaseRegistry::new();
        let dataset = build(
            &registry,
            vec![frame(0.2, 0x100, &[1]), frame(0.1, 0x200, &[2]), frame(0.3, 0x100, &[3])],
        );
        assert_eq!(dataset.record_count(), 3);
        let sequences: Vec<u64> = dataset.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        let summary = dataset.summary();
        assert_eq!(summary.identifiers.len(), 2);
        assert_eq!(summary.first_timestamp, Some(0.2));
        assert_eq!(summary.min_timestamp, Some(0.1));
        assert!((summary.duration() - 0.2).abs() < 1e-12);
        assert_eq!(summary.rx_count, 3);
    }

    #[test]
    fn test_lazy_decode_on_access() {
        let mut registry = DatabaseRegistry::new();
        registry.add(speed_database("a", 0.1));
        let dataset = build(&registry, vec![frame(0.0, 0x123, &[0x10, 0x27]), frame(0.1, 0x7FF, &[1])]);

        assert_eq!(dataset.state(), DatasetState::Ready);
        let view = dataset.record_at(0).unwrap();
        assert_eq!(view.message_name(), Some("Vehicle"));
        assert!((view.signal("Speed").unwrap().physical - 1000.0).abs() < 1e-9);
        assert!(dataset.record_at(1).unwrap().signals.is_none());
        assert!(dataset.record_at(2).is_none());
    }

    #[test]
    fn test_redecode_after_switch() {
        let mut registry = DatabaseRegistry::new();
        registry.add(speed_database("a", 0.1));
        let b = registry.add(speed_database("b", 1.0));
        let dataset = build(&registry, vec![frame(0.0, 0x123, &[0x10, 0x27]); 5]);

        assert_eq!(dataset.redecode(&CancelToken::new()), DecodeOutcome::Completed);
        assert_eq!(dataset.state(), DatasetState::Decoded);

        registry.set_active(&b).unwrap();
        assert_eq!(dataset.state(), DatasetState::Ready);
        // Stale signals stay until the next pass
        assert!((dataset.record_at(0).unwrap().signal("Speed").unwrap().physical - 1000.0).abs() < 1e-9);

        let before: Vec<LogRecord> = dataset.records().to_vec();
        assert_eq!(dataset.redecode(&CancelToken::new()), DecodeOutcome::Completed);
        assert_eq!(dataset.state(), DatasetState::Decoded);
        assert_eq!(dataset.record_at(0).unwrap().signal("Speed").unwrap().physical, 10000.0);
        assert_eq!(dataset.records(), &before[..]);
    }

    #[test]
    fn test_cancelled_pass_keeps_previous_layer() {
        let mut registry = DatabaseRegistry::new();
        registry.add(speed_database("a", 0.1));
        let dataset = build(&registry, vec![frame(0.0, 0x123, &[0x10, 0x27]); 4]);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(dataset.redecode(&cancel), DecodeOutcome::Cancelled);
        assert_eq!(dataset.state(), DatasetState::Ready);
    }

    #[test]
    fn test_no_database_never_decodes() {
        let registry = DatabaseRegistry::new();
        let dataset = build(&registry, vec![frame(0.0, 0x123, &[0x10, 0x27])]);
        assert_eq!(dataset.redecode(&CancelToken::new()), DecodeOutcome::Completed);
        assert!(dataset.record_at(0).unwrap().signals.is_none());
        assert_eq!(dataset.state(), DatasetState::Ready);
        assert!(dataset.decoded_with().is_none());
    }

    #[test]
    fn test_window_and_foreign_handle() {
        let registry = DatabaseRegistry::new();
        let frames = (0..20).map(|i| frame(i as f64, i % 4, &[i as u8])).collect();
        let dataset = build(&registry, frames);
        let handle = dataset.filter(&FilterSpec::new().include_ids([1]));
        assert_eq!(dataset.count_filtered(&handle), 5);
        let window = dataset.window(&handle, 1, 2);
        let seqs: Vec<u64> = window.iter().map(|v| v.sequence()).collect();
        assert_eq!(seqs, vec![5, 9]);
        assert_eq!(dataset.filtered_record_at(&handle, 4).unwrap().sequence(), 17);
        assert!(dataset.filtered_record_at(&handle, 5).is_none());

        let other = DatasetBuilder::new().build(None, AnalyzerConfig::default());
        assert_eq!(other.count_filtered(&handle), 0);
        assert!(other.window(&handle, 0, 10).is_empty());
        assert_eq!(other.filtered_indices(&handle).count(), 0);
    }
}
