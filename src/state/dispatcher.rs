//! Fire-and-forget persistence
//!
//! [`PersistenceDispatcher::submit`] queues a record and returns immediately.
//! A background worker thread hands records to the store; failures are
//! logged, written to the spool when one is configured, and never reach the
//! caller. Records reach the store in submission order: the worker drains
//! the spool before saving a new record, and while older records remain
//! spooled the new one is spooled behind them.
//!
//! The worker is a plain thread so `submit` and `flush` work the same from
//! synchronous callers with no runtime and from inside tokio tasks.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::spool::Spool;
use super::store::SessionStore;
use crate::error::{EntrainError, Result};
use crate::metrics::PersistenceRecord;

enum Message {
    Record(PersistenceRecord),
    Flush(Sender<()>),
    Shutdown,
}

pub struct PersistenceDispatcher {
    sender: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PersistenceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceDispatcher")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl PersistenceDispatcher {
    pub fn new(store: Arc<dyn SessionStore>, spool: Option<Spool>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("entrain-persistence".to_string())
            .spawn(move || run_worker(receiver, store, spool))
            .map_err(|e| EntrainError::InitializationFailure {
                reason: format!("cannot spawn persistence worker: {}", e),
            })?;
        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Queue a record; never blocks and never fails the caller
    pub fn submit(&self, record: PersistenceRecord) {
        if self.sender.send(Message::Record(record)).is_err() {
            warn!("persistence worker gone; record dropped");
        }
    }

    /// Wait until every record submitted so far has been handled
    pub fn flush(&self) {
        let (ack, done) = mpsc::channel();
        if self.sender.send(Message::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }
}

impl Drop for PersistenceDispatcher {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(receiver: Receiver<Message>, store: Arc<dyn SessionStore>, spool: Option<Spool>) {
    debug!("persistence worker started");
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Record(record) => deliver(&record, store.as_ref(), spool.as_ref()),
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
            Message::Shutdown => break,
        }
    }
    debug!("persistence worker stopped");
}

fn deliver(record: &PersistenceRecord, store: &dyn SessionStore, spool: Option<&Spool>) {
    if let Some(spool) = spool {
        if has_backlog(store, spool) {
            debug!(
                session_id = %record.session_id(),
                kind = record.kind(),
                "older records still spooled; queuing behind them"
            );
            spool_record(record, Some(spool));
            return;
        }
    }
    match store.save(record) {
        Ok(()) => {
            debug!(session_id = %record.session_id(), kind = record.kind(), "record persisted");
        }
        Err(e) => {
            warn!(
                session_id = %record.session_id(),
                kind = record.kind(),
                error = %e,
                "persistence failed"
            );
            spool_record(record, spool);
        }
    }
}

/// Drain the spool; true when undelivered records remain
fn has_backlog(store: &dyn SessionStore, spool: &Spool) -> bool {
    match spool.is_empty() {
        Ok(true) => false,
        Ok(false) => match spool.retry_spooled(store) {
            Ok(report) => {
                if report.delivered > 0 {
                    info!(delivered = report.delivered, "spooled records delivered");
                }
                report.failed > 0
            }
            Err(e) => {
                warn!(error = %e, "spool retry failed");
                true
            }
        },
        Err(e) => {
            warn!(error = %e, "cannot read spool");
            false
        }
    }
}

fn spool_record(record: &PersistenceRecord, spool: Option<&Spool>) {
    match spool {
        Some(spool) => {
            if let Err(e) = spool.write(record) {
                warn!(error = %e, "spool write failed; record lost");
            }
        }
        None => warn!("no spool configured; record lost"),
    }
}
