//! Tick scheduler
//!
//! A tokio task calling a tick function at a fixed interval on the monotonic
//! clock. The task ends when the session leaves the running states or when
//! its [`SchedulerHandle`] is cancelled or dropped.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::sequencer::TickOutcome;
use super::state::SessionState;
use crate::error::{EntrainError, Result};

/// Why a scheduler task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExit {
    Completed,
    /// The session reached this state without completing
    Ended(SessionState),
    Cancelled,
    Failed(String),
}

pub struct SchedulerHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<SchedulerExit>>,
}

impl SchedulerHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task to end
    pub async fn join(mut self) -> SchedulerExit {
        match self.task.take() {
            Some(task) => task
                .await
                .unwrap_or_else(|e| SchedulerExit::Failed(e.to_string())),
            None => SchedulerExit::Cancelled,
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.cancel.send(true);
        }
    }
}

/// Spawn the tick loop on the current tokio runtime
pub fn spawn<F>(interval: Duration, mut tick: F) -> Result<SchedulerHandle>
where
    F: FnMut() -> Result<TickOutcome> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        EntrainError::InitializationFailure {
            reason: format!("scheduler needs a tokio runtime: {}", e),
        }
    })?;
    if interval.is_zero() {
        return Err(EntrainError::invalid_parameter(
            "tick_interval",
            format!("{:?}", interval),
            "a non-zero interval",
        ));
    }

    let (cancel, mut cancelled) = watch::channel(false);
    let task = runtime.spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval_ms = interval.as_millis() as u64, "scheduler started");
        loop {
            tokio::select! {
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        debug!("scheduler cancelled");
                        return SchedulerExit::Cancelled;
                    }
                }
                _ = ticker.tick() => {
                    match tick() {
                        Ok(TickOutcome::Running { .. }) => {}
                        Ok(TickOutcome::Completed(_)) => return SchedulerExit::Completed,
                        Ok(TickOutcome::Inactive(SessionState::Paused)) => {}
                        Ok(TickOutcome::Inactive(state)) => {
                            debug!(%state, "scheduler stopping");
                            return SchedulerExit::Ended(state);
                        }
                        Err(e) => {
                            warn!(error = %e, "tick failed; scheduler stopping");
                            return SchedulerExit::Failed(e.to_string());
                        }
                    }
                }
            }
        }
    });

    Ok(SchedulerHandle {
        cancel,
        task: Some(task),
    })
}
