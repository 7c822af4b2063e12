//! Persistence collaborators
//!
//! The engine hands session start and end records to a [`SessionStore`].
//! Stores may fail at any time; the dispatcher falls back to the local spool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use walkdir::WalkDir;

use crate::error::{EntrainError, Result};
use crate::metrics::PersistenceRecord;

/// Destination for session records
pub trait SessionStore: Send + Sync {
    fn save(&self, record: &PersistenceRecord) -> Result<()>;
}

// ============================================================================
// JSON file store
// ============================================================================

/// Writes each record as `<session_id>-<kind>.json` in a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, record: &PersistenceRecord) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", record.session_id(), record.kind()))
    }

    /// Every record in the directory, sorted by file name
    pub fn load_records(&self) -> Result<Vec<PersistenceRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let content = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&content)?)
            })
            .collect()
    }
}

impl SessionStore for JsonFileStore {
    fn save(&self, record: &PersistenceRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| EntrainError::PersistenceFailure {
            reason: format!("cannot create {}: {}", self.dir.display(), e),
        })?;
        let path = self.record_path(record);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content).map_err(|e| EntrainError::PersistenceFailure {
            reason: format!("cannot write {}: {}", path.display(), e),
        })
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Keeps records in memory; can be switched into a failing mode
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PersistenceRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<PersistenceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, record: &PersistenceRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EntrainError::PersistenceFailure {
                reason: "store unavailable".to_string(),
            });
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SessionStartRecord;
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn start_record() -> PersistenceRecord {
        PersistenceRecord::SessionStart(SessionStartRecord {
            session_id: Uuid::new_v4(),
            protocol_id: "calm-alpha".to_string(),
            protocol_name: "Calm Alpha".to_string(),
            started_at: Utc::now(),
            planned_duration_seconds: 300.0,
        })
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));
        let record = start_record();
        store.save(&record).unwrap();
        assert_eq!(store.load_records().unwrap(), vec![record]);
    }

    #[test]
    fn test_missing_dir_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope"));
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_failure_mode() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = store.save(&start_record()).unwrap_err();
        assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");
        store.set_failing(false);
        store.save(&start_record()).unwrap();
        assert_eq!(store.records().len(), 1);
    }
}
