//! Persistence Integration Tests
//!
//! Session records flowing from the engine to the store, and the spool
//! absorbing store failures without disturbing the session.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use entrain::engine::ManualClock;
use entrain::metrics::{PersistenceRecord, SessionRecord, SessionStatus};
use entrain::protocol::{FrequencySpec, Phase, Protocol};
use entrain::session::{SessionState, TickOutcome};
use entrain::state::{JsonFileStore, MemoryStore, Spool};
use entrain::{EngineConfig, EntrainmentEngine};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn config() -> EngineConfig {
    EngineConfig {
        noise_seed: Some(9),
        ..Default::default()
    }
}

fn protocol() -> Arc<Protocol> {
    Arc::new(
        Protocol::new(
            "theta-dip",
            "Theta Dip",
            60.0,
            vec![
                Phase::new("enter", 0.5, FrequencySpec::Sweep { start: 10.0, end: 6.0 })
                    .with_tag("descent"),
                Phase::new("hold", 0.5, FrequencySpec::Constant { hz: 6.0 }).with_tag("hold"),
            ],
        )
        .unwrap(),
    )
}

fn end_records(records: &[PersistenceRecord]) -> Vec<&SessionRecord> {
    records
        .iter()
        .filter_map(|r| match r {
            PersistenceRecord::SessionEnd(end) => Some(end),
            PersistenceRecord::SessionStart(_) => None,
        })
        .collect()
}

#[test]
fn test_completed_session_written_to_json_store() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let clock = Arc::new(ManualClock::new());
    let engine = EntrainmentEngine::builder(config())
        .with_clock(clock.clone())
        .with_store(store.clone())
        .build()
        .unwrap();

    let start = engine.start(protocol(), 60.0).unwrap();
    let mut completed = None;
    for _ in 0..=60 {
        if let TickOutcome::Completed(record) = engine.tick().unwrap() {
            completed = Some(record);
            break;
        }
        clock.advance(Duration::from_secs(1));
    }
    let completed = completed.expect("session should complete");
    engine.flush_persistence();

    let records = store.load_records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.session_id() == start.session_id));
    let ends = end_records(&records);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].session_id, completed.session_id);
    assert_eq!(ends[0].phases_completed, 2);
    assert_eq!(ends[0].status, SessionStatus::Completed);
    assert!(ends[0].completed);
    assert_eq!(ends[0].protocol_id, "theta-dip");
    assert!(ends[0].sample_count > 50);
}

#[test]
fn test_store_failure_is_spooled_and_never_blocks() {
    let spool_dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.set_failing(true);
    let clock = Arc::new(ManualClock::new());
    let engine = EntrainmentEngine::builder(config())
        .with_clock(clock.clone())
        .with_store(store.clone())
        .with_spool_dir(spool_dir.path())
        .build()
        .unwrap();

    engine.start(protocol(), 60.0).unwrap();
    clock.advance(Duration::from_secs(12));
    engine.tick().unwrap();
    let record = engine.stop().unwrap();
    assert_eq!(record.status, SessionStatus::Stopped);
    assert_eq!(engine.state(), SessionState::Stopped);
    engine.flush_persistence();

    let spool = Spool::new(spool_dir.path());
    assert_eq!(spool.len().unwrap(), 2);
    assert!(store.records().is_empty());

    store.set_failing(false);
    let report = spool.retry_spooled(store.as_ref()).unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.corrupt, 0);
    assert!(spool.is_empty().unwrap());
    let mut kinds: Vec<&str> = store.records().iter().map(|r| r.kind()).collect();
    kinds.sort();
    assert_eq!(kinds, vec!["end", "start"]);
}

#[test]
fn test_spool_drains_after_store_recovers() {
    let spool_dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_store(store.clone())
        .with_spool_dir(spool_dir.path())
        .build()
        .unwrap();

    store.set_failing(true);
    engine.start(protocol(), 60.0).unwrap();
    engine.flush_persistence();
    store.set_failing(false);
    engine.stop().unwrap();
    engine.flush_persistence();

    assert!(Spool::new(spool_dir.path()).is_empty().unwrap());
    let kinds: Vec<&str> = store.records().iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec!["start", "end"]);
}

#[test]
fn test_emergency_stop_record_persisted() {
    let store = Arc::new(MemoryStore::new());
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_store(store.clone())
        .build()
        .unwrap();

    engine.start(protocol(), 60.0).unwrap();
    engine.emergency_stop().unwrap();
    engine.flush_persistence();

    let records = store.records();
    let ends = end_records(&records);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].status, SessionStatus::EmergencyStopped);
    assert!(!ends[0].completed);
}

#[test]
fn test_record_json_shape() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_store(store)
        .build()
        .unwrap();
    let start = engine.start(protocol(), 60.0).unwrap();
    engine.flush_persistence();

    let path = dir.path().join(format!("{}-start.json", start.session_id));
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(value["type"], "session_start");
    assert_eq!(value["protocol_id"], "theta-dip");
    assert_eq!(value["planned_duration_seconds"], 60.0);
}
