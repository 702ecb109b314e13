//! Main analyzer API
//!
//! The [`Analyzer`] is the entry point for loading definitions databases,
//! choosing the active one and importing log files into datasets. Datasets
//! are independent of each other and of the analyzer once imported; they
//! follow the active database through a shared selection handle.

use crate::config::AnalyzerConfig;
use crate::dataset::Dataset;
use crate::import::{CancelToken, ImportHandle, ImportJob};
use crate::signals::database::DefinitionsDatabase;
use crate::signals::dbc::{parse_dbc_file, parse_dbc_str};
use crate::signals::registry::{DatabaseId, DatabaseInfo, DatabaseRegistry};
use crate::types::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// The main analyzer struct - entry point for all operations
#[derive(Debug, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
    registry: DatabaseRegistry,
}

impl Analyzer {
    /// Create a new analyzer instance
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            registry: DatabaseRegistry::new(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatabaseRegistry {
        &self.registry
    }

    /// Load a DBC file and register it
    ///
    /// # Arguments
    /// * `path` - Path to the DBC file
    ///
    /// # Returns
    /// * `Result<DatabaseId>` - Registry id of the new database. Blocks that
    ///   failed to parse are listed in the database's warnings.
    ///
    /// # Example
    /// ```no_run
    /// use can_log_core::{Analyzer, AnalyzerConfig};
    /// use std::path::Path;
    ///
    /// let mut analyzer = Analyzer::new(AnalyzerConfig::default());
    /// let id = analyzer.import_definitions(Path::new("powertrain.dbc")).unwrap();
    /// analyzer.set_active_database(&id).unwrap();
    /// ```
    pub fn import_definitions(&mut self, path: &Path) -> Result<DatabaseId> {
        log::info!("Loading DBC file: {:?}", path);
        let database = parse_dbc_file(path)?;
        Ok(self.register(database))
    }

    /// Load definitions from text already in memory; `source` names it
    pub fn import_definitions_str(&mut self, source: &Path, content: &str) -> Result<DatabaseId> {
        let database = parse_dbc_str(source, content)?;
        Ok(self.register(database))
    }

    /// Register a DBC file without parsing it yet
    pub fn register_definitions(&mut self, path: impl Into<PathBuf>) -> DatabaseId {
        self.registry.register_unloaded(path)
    }

    /// Parse a database registered with [`Analyzer::register_definitions`]
    pub fn load_definitions(&mut self, id: &str) -> Result<()> {
        self.registry.load(id)
    }

    /// Select the database used for decoding. Existing datasets keep their
    /// signals until re-decoded.
    pub fn set_active_database(&mut self, id: &str) -> Result<()> {
        self.registry.set_active(id)
    }

    pub fn clear_active_database(&mut self) {
        self.registry.clear_active();
    }

    pub fn remove_database(&mut self, id: &str) -> Result<Arc<DefinitionsDatabase>> {
        self.registry.remove(id)
    }

    pub fn active_database(&self) -> Option<Arc<DefinitionsDatabase>> {
        self.registry.active()
    }

    pub fn database(&self, id: &str) -> Option<&Arc<DefinitionsDatabase>> {
        self.registry.get(id)
    }

    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.registry.list()
    }

    /// Import one log file on the calling thread
    pub fn import_log(&self, path: &Path) -> Result<Arc<Dataset>> {
        self.import_logs(&[path.to_path_buf()])
    }

    /// Import several log files into one dataset on the calling thread
    pub fn import_logs(&self, paths: &[PathBuf]) -> Result<Arc<Dataset>> {
        let progress = AtomicU64::new(0);
        let dataset = self.job(paths).run(&progress, &CancelToken::new())?;
        Ok(Arc::new(dataset))
    }

    /// Import log files on a worker thread
    ///
    /// # Example
    /// ```no_run
    /// use can_log_core::{Analyzer, AnalyzerConfig};
    /// use std::path::PathBuf;
    ///
    /// let analyzer = Analyzer::new(AnalyzerConfig::default());
    /// let handle = analyzer.spawn_import(vec![PathBuf::from("trace.blf")]);
    /// println!("{} records so far", handle.records_available());
    /// let dataset = handle.wait().unwrap();
    /// println!("{} records", dataset.record_count());
    /// ```
    pub fn spawn_import(&self, paths: Vec<PathBuf>) -> ImportHandle {
        ImportHandle::spawn(self.job(&paths))
    }

    fn job(&self, paths: &[PathBuf]) -> ImportJob {
        ImportJob {
            paths: paths.to_vec(),
            selection: Some(self.registry.selection()),
            config: self.config.clone(),
        }
    }

    fn register(&mut self, database: DefinitionsDatabase) -> DatabaseId {
        let stats = database.stats();
        let warnings = database.warnings().len();
        let id = self.registry.add(database);
        log::info!(
            "Database {} loaded: {} messages, {} signals, {} warnings",
            id,
            stats.num_messages,
            stats.num_signals,
            warnings
        );
        id
    }
}
