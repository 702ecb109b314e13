//! Background import and re-decode workers
//!
//! Each import runs on its own thread. Progress is a single counter of
//! records parsed so far; the dataset becomes visible only once the worker
//! has finished. Both kinds of job can be cancelled through a shared
//! [`CancelToken`].

use crate::config::AnalyzerConfig;
use crate::dataset::{Dataset, DatasetBuilder, DatasetState, DecodeOutcome};
use crate::formats::open_log;
use crate::signals::registry::ActiveSelection;
use crate::types::{AnalyzerError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything needed to turn log files into a dataset
#[derive(Debug, Clone)]
pub(crate) struct ImportJob {
    pub paths: Vec<PathBuf>,
    pub selection: Option<Arc<ActiveSelection>>,
    pub config: AnalyzerConfig,
}

impl ImportJob {
    /// Parse every source in order into one dataset, then decode it if
    /// configured. `progress` receives the number of records parsed so far.
    pub(crate) fn run(self, progress: &AtomicU64, cancel: &CancelToken) -> Result<Dataset> {
        let step = self.config.progress_step();
        let mut builder = DatasetBuilder::new();

        for path in &self.paths {
            log::info!("Importing log file: {:?}", path);
            let mut source = open_log(path, &self.config)?;
            let format = source.format();

            for frame in source.by_ref() {
                builder.push(frame);
                if builder.len() % step == 0 {
                    progress.store(builder.len() as u64, Ordering::Release);
                    if cancel.is_cancelled() {
                        log::info!("Import of {:?} cancelled after {} records", path, builder.len());
                        return Err(AnalyzerError::Cancelled);
                    }
                }
            }

            builder.finish_source(path, format, source.summary().clone());
            progress.store(builder.len() as u64, Ordering::Release);
        }

        if cancel.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }

        let decode = self.config.decode_on_import;
        let dataset = builder.build(self.selection, self.config);
        if decode && dataset.redecode(cancel) == DecodeOutcome::Cancelled {
            return Err(AnalyzerError::Cancelled);
        }

        log::info!(
            "Dataset {} ready: {} records from {} source(s)",
            dataset.id(),
            dataset.record_count(),
            dataset.summary().sources.len()
        );
        Ok(dataset)
    }
}

#[derive(Debug)]
enum ImportStatus {
    Pending,
    Running,
    Published(Arc<Dataset>),
    Failed(String),
}

#[derive(Debug)]
struct ImportShared {
    records: AtomicU64,
    status: Mutex<ImportStatus>,
}

impl ImportShared {
    fn set(&self, status: ImportStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// A running import
pub struct ImportHandle {
    shared: Arc<ImportShared>,
    cancel: CancelToken,
    worker: JoinHandle<Result<Arc<Dataset>>>,
}

impl ImportHandle {
    pub(crate) fn spawn(job: ImportJob) -> Self {
        let shared = Arc::new(ImportShared {
            records: AtomicU64::new(0),
            status: Mutex::new(ImportStatus::Pending),
        });
        let cancel = CancelToken::new();

        let worker = {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            thread::spawn(move || {
                shared.set(ImportStatus::Running);
                match job.run(&shared.records, &cancel) {
                    Ok(dataset) => {
                        let dataset = Arc::new(dataset);
                        shared.set(ImportStatus::Published(Arc::clone(&dataset)));
                        Ok(dataset)
                    }
                    Err(e) => {
                        log::error!("Import failed: {}", e);
                        shared.set(ImportStatus::Failed(e.to_string()));
                        Err(e)
                    }
                }
            })
        };

        Self { shared, cancel, worker }
    }

    /// Records parsed so far; never decreases
    pub fn records_available(&self) -> u64 {
        self.shared.records.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn state(&self) -> DatasetState {
        match &*self.shared.status.lock().unwrap_or_else(PoisonError::into_inner) {
            ImportStatus::Pending => DatasetState::Empty,
            ImportStatus::Running => DatasetState::Loading {
                records_available: self.records_available(),
            },
            ImportStatus::Published(dataset) => dataset.state(),
            ImportStatus::Failed(reason) => DatasetState::Failed(reason.clone()),
        }
    }

    /// The dataset, once published
    pub fn dataset(&self) -> Option<Arc<Dataset>> {
        match &*self.shared.status.lock().unwrap_or_else(PoisonError::into_inner) {
            ImportStatus::Published(dataset) => Some(Arc::clone(dataset)),
            _ => None,
        }
    }

    /// Block until the worker finishes
    pub fn wait(self) -> Result<Arc<Dataset>> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => {
                self.shared.set(ImportStatus::Failed("import worker panicked".into()));
                Err(AnalyzerError::Worker("import worker panicked".into()))
            }
        }
    }
}

/// A running re-decode pass
pub struct DecodeHandle {
    cancel: CancelToken,
    worker: JoinHandle<DecodeOutcome>,
}

impl DecodeHandle {
    pub(crate) fn spawn(dataset: Arc<Dataset>) -> Self {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let worker = thread::spawn(move || dataset.redecode(&token));
        Self { cancel, worker }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn wait(self) -> Result<DecodeOutcome> {
        self.worker
            .join()
            .map_err(|_| AnalyzerError::Worker("decode worker panicked".into()))
    }
}
