//! Registry of loaded definitions databases
//!
//! Any number of databases can be loaded; at most one is active. The active
//! choice lives in an [`ActiveSelection`] shared with every dataset, so a
//! dataset can tell when its decoded signals were produced under a database
//! that is no longer active.

use crate::signals::database::DefinitionsDatabase;
use crate::signals::dbc::parse_dbc_file;
use crate::types::{AnalyzerError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Registry key of a database, derived from its file stem
pub type DatabaseId = String;

/// Summary row for one registered database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub id: DatabaseId,
    pub path: PathBuf,
    pub loaded: bool,
    pub message_count: usize,
    pub signal_count: usize,
    pub node_count: usize,
    pub version: Option<String>,
    pub active: bool,
    pub warning_count: usize,
}

/// The active database as seen at one instant
#[derive(Debug, Clone, Default)]
pub struct SelectionSnapshot {
    /// Bumped on every change of the active database
    pub generation: u64,
    pub id: Option<DatabaseId>,
    pub database: Option<Arc<DefinitionsDatabase>>,
}

/// Shared, versioned handle on the active database
#[derive(Debug, Default)]
pub struct ActiveSelection {
    state: RwLock<SelectionSnapshot>,
}

impl ActiveSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    pub fn database(&self) -> Option<Arc<DefinitionsDatabase>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .database
            .clone()
    }

    fn replace(&self, id: Option<DatabaseId>, database: Option<Arc<DefinitionsDatabase>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let unchanged = state.id == id
            && match (&state.database, &database) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
        if unchanged {
            return;
        }
        state.generation += 1;
        state.id = id;
        state.database = database;
        log::debug!(
            "Active database is now {:?} (generation {})",
            state.id,
            state.generation
        );
    }
}

/// All definitions databases known to an analyzer
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    entries: Vec<(DatabaseId, Arc<DefinitionsDatabase>)>,
    selection: Arc<ActiveSelection>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle shared with datasets to follow the active database
    pub fn selection(&self) -> Arc<ActiveSelection> {
        Arc::clone(&self.selection)
    }

    /// Register a database under a unique id. The first database added to an
    /// empty selection becomes active.
    pub fn add(&mut self, database: DefinitionsDatabase) -> DatabaseId {
        let id = self.unique_id(database.source());
        log::info!(
            "Registered definitions {:?} as '{}' ({} messages)",
            database.source(),
            id,
            database.message_count()
        );
        self.entries.push((id.clone(), Arc::new(database)));
        if self.active_id().is_none() && self.entries.len() == 1 {
            self.activate(Some(id.clone()));
        }
        id
    }

    /// Register a source without parsing it yet; see [`DatabaseRegistry::load`]
    pub fn register_unloaded(&mut self, path: impl Into<PathBuf>) -> DatabaseId {
        self.add(DefinitionsDatabase::unloaded(path))
    }

    /// Parse the source of a registered database, replacing its entry
    pub fn load(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        let path = self.entries[index].1.source().to_path_buf();
        let database = Arc::new(parse_dbc_file(&path)?);
        self.entries[index].1 = database;
        if self.active_id().as_deref() == Some(id) {
            self.activate(Some(id.to_string()));
        }
        Ok(())
    }

    /// Remove a database. Removing the active one activates the first
    /// remaining database, or none.
    pub fn remove(&mut self, id: &str) -> Result<Arc<DefinitionsDatabase>> {
        let index = self.position(id)?;
        let (_, database) = self.entries.remove(index);
        if self.active_id().as_deref() == Some(id) {
            let next = self.entries.first().map(|(next, _)| next.clone());
            self.activate(next);
        }
        log::info!("Removed definitions '{}'", id);
        Ok(database)
    }

    /// Make `id` the database every dataset decodes against
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        self.position(id)?;
        self.activate(Some(id.to_string()));
        Ok(())
    }

    /// Leave no database active; decoding then produces no signals
    pub fn clear_active(&mut self) {
        self.activate(None);
    }

    pub fn active(&self) -> Option<Arc<DefinitionsDatabase>> {
        self.selection.database()
    }

    pub fn active_id(&self) -> Option<DatabaseId> {
        self.selection.snapshot().id
    }

    pub fn get(&self, id: &str) -> Option<&Arc<DefinitionsDatabase>> {
        self.entries.iter().find(|(key, _)| key == id).map(|(_, db)| db)
    }

    pub fn list(&self) -> Vec<DatabaseInfo> {
        let active = self.active_id();
        self.entries
            .iter()
            .map(|(id, db)| {
                let stats = db.stats();
                DatabaseInfo {
                    id: id.clone(),
                    path: db.source().to_path_buf(),
                    loaded: db.is_loaded(),
                    message_count: stats.num_messages,
                    signal_count: stats.num_signals,
                    node_count: stats.num_nodes,
                    version: db.version().map(str::to_string),
                    active: active.as_deref() == Some(id.as_str()),
                    warning_count: db.warnings().len(),
                }
            })
            .collect()
    }

    /// Remove every database
    pub fn clear(&mut self) {
        self.entries.clear();
        self.activate(None);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key == id)
            .ok_or_else(|| AnalyzerError::UnknownDatabase(id.to_string()))
    }

    fn activate(&self, id: Option<DatabaseId>) {
        let database = id.as_deref().and_then(|id| self.get(id)).cloned();
        self.selection.replace(id, database);
    }

    fn unique_id(&self, source: &Path) -> DatabaseId {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("database");
        if self.get(stem).is_none() {
            return stem.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", stem, n))
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_else(|| stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::MessageDefinition;

    fn database(path: &str, id: u32) -> DefinitionsDatabase {
        let mut db = DefinitionsDatabase::new(path);
        db.add_message(MessageDefinition::new(id, format!("Msg{:X}", id), 8));
        db
    }

    #[test]
    fn test_first_database_becomes_active() {
        let mut registry = DatabaseRegistry::new();
        let first = registry.add(database("/tmp/body.dbc", 0x100));
        let second = registry.add(database("/tmp/chassis.dbc", 0x200));

        assert_eq!(first, "body");
        assert_eq!(second, "chassis");
        assert_eq!(registry.active_id().as_deref(), Some("body"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unique_ids_from_same_stem() {
        let mut registry = DatabaseRegistry::new();
        assert_eq!(registry.add(database("/a/car.dbc", 1)), "car");
        assert_eq!(registry.add(database("/b/car.dbc", 2)), "car_1");
        assert_eq!(registry.add(database("/c/car.dbc", 3)), "car_2");
    }

    #[test]
    fn test_set_active_and_generation() {
        let mut registry = DatabaseRegistry::new();
        registry.add(database("one.dbc", 0x100));
        registry.add(database("two.dbc", 0x200));
        let selection = registry.selection();
        let before = selection.generation();

        registry.set_active("two").unwrap();
        assert_eq!(selection.generation(), before + 1);
        assert!(selection.database().unwrap().lookup(0x200).is_some());

        // Re-selecting the same database is not a change
        registry.set_active("two").unwrap();
        assert_eq!(selection.generation(), before + 1);

        assert!(matches!(
            registry.set_active("missing"),
            Err(AnalyzerError::UnknownDatabase(_))
        ));
    }

    #[test]
    fn test_remove_active_falls_back_to_first() {
        let mut registry = DatabaseRegistry::new();
        registry.add(database("one.dbc", 0x100));
        registry.add(database("two.dbc", 0x200));
        registry.add(database("three.dbc", 0x300));
        registry.set_active("three").unwrap();

        registry.remove("three").unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("one"));

        registry.remove("one").unwrap();
        registry.remove("two").unwrap();
        assert!(registry.active().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_reports_state() {
        let mut registry = DatabaseRegistry::new();
        registry.add(database("one.dbc", 0x100));
        registry.register_unloaded("later.dbc");

        let infos = registry.list();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].active && infos[0].loaded);
        assert_eq!(infos[0].message_count, 1);
        assert!(!infos[1].active && !infos[1].loaded);
    }

    #[test]
    fn test_load_unknown_source_fails() {
        let mut registry = DatabaseRegistry::new();
        let id = registry.register_unloaded("/nonexistent/dir/none.dbc");
        assert!(matches!(registry.load(&id), Err(AnalyzerError::Io { .. })));
        assert!(matches!(registry.load("nope"), Err(AnalyzerError::UnknownDatabase(_))));
    }
}
