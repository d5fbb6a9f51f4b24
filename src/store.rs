//! Durable storage for the performance table

use crate::error::{Result, ReviewError};
use crate::types::performance::PerformanceTable;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Repository for the performance table.
///
/// `save` replaces the stored table wholesale; there is no merge.
pub trait PerformanceStore: Send + Sync {
    fn load(&self) -> Result<PerformanceTable>;
    fn save(&self, table: &PerformanceTable) -> Result<()>;
}

/// Performance table kept as a JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PerformanceStore for JsonFileStore {
    fn load(&self) -> Result<PerformanceTable> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| ReviewError::Store(format!("{}: {}", self.path.display(), e)))?;
        let table: PerformanceTable = serde_json::from_slice(&bytes)
            .map_err(|e| ReviewError::Store(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), models = table.len(), "Performance table loaded");
        Ok(table)
    }

    /// Write to a sibling temp file and rename it over the target, so readers
    /// only ever see a complete table.
    fn save(&self, table: &PerformanceTable) -> Result<()> {
        let store_err = |e: std::io::Error| {
            ReviewError::Store(format!("{}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(store_err)?;
        }

        let json = serde_json::to_vec_pretty(table)
            .map_err(|e| ReviewError::Store(format!("serialize: {}", e)))?;

        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let mut file = std::fs::File::create(&tmp).map_err(store_err)?;
        file.write_all(&json).map_err(store_err)?;
        file.sync_all().map_err(store_err)?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(store_err)?;

        info!(path = %self.path.display(), models = table.len(), "Performance table saved");
        Ok(())
    }
}

/// Store kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: RwLock<Option<PerformanceTable>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: PerformanceTable) -> Self {
        Self {
            table: RwLock::new(Some(table)),
        }
    }
}

impl PerformanceStore for InMemoryStore {
    fn load(&self) -> Result<PerformanceTable> {
        let guard = self
            .table
            .read()
            .map_err(|e| ReviewError::Store(format!("lock error: {}", e)))?;
        guard
            .clone()
            .ok_or_else(|| ReviewError::Store("no performance table saved".to_string()))
    }

    fn save(&self, table: &PerformanceTable) -> Result<()> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| ReviewError::Store(format!("lock error: {}", e)))?;
        *guard = Some(table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::performance::PerformanceRecord;

    fn record(f1: f64, mcc: f64, time: f64) -> PerformanceRecord {
        PerformanceRecord {
            precision: 0.5,
            recall: 0.4,
            f1,
            mcc,
            latency_seconds: time,
        }
    }

    fn sample_table() -> PerformanceTable {
        let mut table = PerformanceTable::new();
        table.insert("LODA", record(0.62, 0.30, 5.0));
        table.insert("ECOD", record(0.70, 0.25, 1.2));
        table.insert("COPOD", record(0.65, 0.40, 0.8));
        table
    }

    #[test]
    fn test_json_store_round_trip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("json").join("models_performance.json"));

        store.save(&sample_table()).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, sample_table());
        assert_eq!(loaded.names(), vec!["LODA", "ECOD", "COPOD"]);
    }

    #[test]
    fn test_save_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("perf.json"));
        store.save(&sample_table()).unwrap();

        let mut smaller = PerformanceTable::new();
        smaller.insert("SUOD", record(0.5, 0.5, 0.5));
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap().names(), vec!["SUOD"]);
        // no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(ReviewError::Store(_))));
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        std::fs::write(&path, b"{\"LODA\": [1, 2").unwrap();
        assert!(matches!(
            JsonFileStore::new(&path).load(),
            Err(ReviewError::Store(_))
        ));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryStore::new();
        assert!(store.load().is_err());
        store.save(&sample_table()).unwrap();
        assert_eq!(store.load().unwrap().len(), 3);
    }
}
