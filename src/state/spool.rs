//! Durable spool for records the store could not accept
//!
//! Each failed record is written as a JSON envelope carrying a SHA-256 of the
//! serialized record. [`Spool::retry_spooled`] replays the envelopes in the
//! order they were written, deleting each one the store accepts. Envelopes
//! that fail to parse or whose checksum does not match are renamed to
//! `*.corrupt` and skipped. Entries that cannot be read right now stay in
//! place for the next pass.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::store::SessionStore;
use crate::error::{EntrainError, Result};
use crate::metrics::PersistenceRecord;

const SPOOL_EXTENSION: &str = "json";
const CORRUPT_EXTENSION: &str = "corrupt";

/// Tiebreaker for entries written within the same millisecond
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolEnvelope {
    pub id: Uuid,
    pub spooled_at: DateTime<Utc>,
    /// Hex SHA-256 of the serialized record
    pub checksum: String,
    pub record: PersistenceRecord,
}

impl SpoolEnvelope {
    pub fn new(record: PersistenceRecord) -> Result<Self> {
        let checksum = checksum(&record)?;
        Ok(Self {
            id: Uuid::new_v4(),
            spooled_at: Utc::now(),
            checksum,
            record,
        })
    }

    pub fn verify(&self) -> Result<bool> {
        Ok(checksum(&self.record)? == self.checksum)
    }
}

fn checksum(record: &PersistenceRecord) -> Result<String> {
    let content = serde_json::to_vec(record)?;
    Ok(format!("{:x}", Sha256::digest(&content)))
}

/// Outcome of a retry pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub delivered: usize,
    pub failed: usize,
    pub corrupt: usize,
}

#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a record to the spool
    pub fn write(&self, record: &PersistenceRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let envelope = SpoolEnvelope::new(record.clone())?;
        let content = serde_json::to_string_pretty(&envelope)?;
        // Millisecond prefix then sequence keeps file names in write order
        let stamp = envelope.spooled_at.format("%Y%m%d%H%M%S%3f").to_string();
        loop {
            let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let path = self
                .dir
                .join(format!("{}-{:010}.{}", stamp, sequence, SPOOL_EXTENSION));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())?;
                    debug!(path = %path.display(), kind = record.kind(), "record spooled");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Spooled envelopes, oldest first
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .filter(|path| path.extension().is_some_and(|ext| ext == SPOOL_EXTENSION))
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self, path: &Path) -> Result<SpoolEnvelope> {
        let content = fs::read(path)?;
        let envelope: SpoolEnvelope = serde_json::from_slice(&content)?;
        if !envelope.verify()? {
            return Err(EntrainError::PersistenceFailure {
                reason: format!("checksum mismatch in {}", path.display()),
            });
        }
        Ok(envelope)
    }

    fn quarantine(&self, path: &Path) {
        let target = path.with_extension(CORRUPT_EXTENSION);
        if let Err(e) = fs::rename(path, &target) {
            warn!(path = %path.display(), error = %e, "could not quarantine spool entry");
        }
    }

    /// Replay spooled records into `store`, oldest first
    ///
    /// Stops at the first entry that cannot be delivered so later records
    /// never overtake it; the rest count as failed and stay spooled.
    pub fn retry_spooled(&self, store: &dyn SessionStore) -> Result<RetryReport> {
        let mut report = RetryReport::default();
        let pending = self.pending()?;
        for (index, path) in pending.iter().enumerate() {
            let envelope = match self.read(path) {
                Ok(envelope) => envelope,
                Err(EntrainError::Io(e)) => {
                    warn!(path = %path.display(), error = %e, "spool entry unreadable; left for next pass");
                    report.failed += pending.len() - index;
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping corrupt spool entry");
                    self.quarantine(path);
                    report.corrupt += 1;
                    continue;
                }
            };
            if let Err(e) = store.save(&envelope.record) {
                debug!(path = %path.display(), error = %e, "spooled record still undeliverable");
                report.failed += pending.len() - index;
                break;
            }
            fs::remove_file(path)?;
            report.delivered += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SessionStartRecord;
    use crate::state::MemoryStore;
    use tempfile::tempdir;

    fn record(protocol: &str) -> PersistenceRecord {
        PersistenceRecord::SessionStart(SessionStartRecord {
            session_id: Uuid::new_v4(),
            protocol_id: protocol.to_string(),
            protocol_name: protocol.to_string(),
            started_at: Utc::now(),
            planned_duration_seconds: 60.0,
        })
    }

    #[test]
    fn test_write_and_retry() {
        let dir = tempdir().unwrap();
        let spool = Spool::new(dir.path());
        spool.write(&record("a")).unwrap();
        spool.write(&record("b")).unwrap();
        assert_eq!(spool.len().unwrap(), 2);

        let store = MemoryStore::new();
        store.set_failing(true);
        let report = spool.retry_spooled(&store).unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(spool.len().unwrap(), 2);

        store.set_failing(false);
        let report = spool.retry_spooled(&store).unwrap();
        assert_eq!(report.delivered, 2);
        assert!(spool.is_empty().unwrap());
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn test_tampered_envelope_is_quarantined() {
        let dir = tempdir().unwrap();
        let spool = Spool::new(dir.path());
        let path = spool.write(&record("calm-alpha")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("calm-alpha", "tampered")).unwrap();

        let store = MemoryStore::new();
        let report = spool.retry_spooled(&store).unwrap();
        assert_eq!(report.corrupt, 1);
        assert_eq!(report.delivered, 0);
        assert!(spool.is_empty().unwrap());
        assert!(path.with_extension("corrupt").exists());
    }

    fn protocol_ids(store: &MemoryStore) -> Vec<String> {
        store
            .records()
            .iter()
            .filter_map(|r| match r {
                PersistenceRecord::SessionStart(start) => Some(start.protocol_id.clone()),
                PersistenceRecord::SessionEnd(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_retry_preserves_write_order() {
        let dir = tempdir().unwrap();
        let spool = Spool::new(dir.path());
        let expected: Vec<String> = (0..40).map(|i| format!("p{:02}", i)).collect();
        for id in &expected {
            spool.write(&record(id)).unwrap();
        }

        let store = MemoryStore::new();
        let report = spool.retry_spooled(&store).unwrap();
        assert_eq!(report.delivered, 40);
        assert_eq!(protocol_ids(&store), expected);
    }

    #[test]
    fn test_io_error_is_not_treated_as_corrupt() {
        let dir = tempdir().unwrap();
        let spool = Spool::new(dir.path());
        let err = spool.read(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, EntrainError::Io(_)));

        fs::write(dir.path().join("0-garbage.json"), "not json").unwrap();
        let err = spool.read(&dir.path().join("0-garbage.json")).unwrap_err();
        assert!(matches!(err, EntrainError::Serialization(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_stays_spooled() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let spool = Spool::new(dir.path());
        let path = spool.write(&record("calm-alpha")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&path).is_ok() {
            // Privileged users bypass file modes
            return;
        }

        let report = spool.retry_spooled(&MemoryStore::new()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.corrupt, 0);
        assert!(path.exists());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let store = MemoryStore::new();
        assert_eq!(spool.retry_spooled(&store).unwrap().delivered, 1);
    }

    #[test]
    fn test_garbage_file_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0-garbage.json"), "not json").unwrap();
        let spool = Spool::new(dir.path());
        let report = spool.retry_spooled(&MemoryStore::new()).unwrap();
        assert_eq!(report.corrupt, 1);
    }
}
