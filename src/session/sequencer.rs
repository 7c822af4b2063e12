//! Phase sequencer
//!
//! Owns the running [`Session`] and its lifecycle state. The sequencer is
//! clock-agnostic: every operation receives the current session-clock time in
//! seconds and the [`SignalGraph`] it drives, so the same code runs under the
//! tokio scheduler, the offline renderer and tests with a manual clock.
//!
//! Phase timing is anchored on `phase_started_at`. Advancing to the next
//! phase moves the anchor forward by exactly the finished phase's duration
//! (not to "now"), so a late tick never shortens the following phase, and a
//! single tick can cross several short phases. `resume()` moves the anchor
//! forward by the paused interval so the remaining phase time is unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::SessionState;
use crate::config::EngineConfig;
use crate::dsp::SignalGraph;
use crate::error::{EntrainError, Result};
use crate::metrics::{MetricsEmitter, SessionRecord, SessionStartRecord, SessionStatus};
use crate::protocol::{Phase, Protocol};
use crate::safety::{clamp_beat_hz, SafetyGovernor, SilenceReport};
use crate::trajectory::{self, TrajectoryPoint};

// ============================================================================
// Settings
// ============================================================================

/// Ramp timings used by the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerSettings {
    /// Ramp for each tick's beat-frequency update
    pub tick_ramp_seconds: f64,
    /// Master fade for start, pause, resume, stop and completion
    pub fade_seconds: f64,
    /// Ramp for caller volume changes
    pub volume_ramp_seconds: f64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SequencerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick_ramp_seconds: config.tick_ramp_seconds,
            fade_seconds: config.pause_fade_seconds,
            volume_ramp_seconds: config.default_ramp_seconds,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// A running (or just finalized) session
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    protocol: Arc<Protocol>,
    total_duration_seconds: f64,
    started_at: DateTime<Utc>,
    /// Session-clock time of `start()`
    start_clock: f64,
    phase_index: usize,
    /// Session-clock time the current phase began, shifted by pauses
    phase_started_at: f64,
    paused_at: Option<f64>,
    paused_total: f64,
    /// Session-clock time the session was finalized
    ended_at: Option<f64>,
    phase_progress: f64,
    phases_completed: usize,
    current: TrajectoryPoint,
    metrics: MetricsEmitter,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.total_duration_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.protocol.phase(self.phase_index)
    }

    /// Progress within the current phase as of the last tick
    pub fn phase_progress(&self) -> f64 {
        self.phase_progress
    }

    pub fn phases_completed(&self) -> usize {
        self.phases_completed
    }

    /// Trajectory point pushed by the last tick
    pub fn current_point(&self) -> TrajectoryPoint {
        self.current
    }

    pub fn metrics(&self) -> &MetricsEmitter {
        &self.metrics
    }

    pub fn paused_seconds(&self) -> f64 {
        self.paused_total
    }

    /// Length of phase `index` in seconds
    pub fn phase_duration_seconds(&self, index: usize) -> f64 {
        self.protocol
            .phase(index)
            .map(|p| p.duration * self.total_duration_seconds)
            .unwrap_or(0.0)
    }

    /// Session time elapsed at `now`, pauses excluded
    pub fn elapsed_at(&self, now: f64) -> f64 {
        let now = self.ended_at.unwrap_or(now);
        let open_pause = self.paused_at.map(|at| now - at).unwrap_or(0.0);
        (now - self.start_clock - self.paused_total - open_pause).max(0.0)
    }

    pub fn session_progress_at(&self, now: f64) -> f64 {
        (self.elapsed_at(now) / self.total_duration_seconds).clamp(0.0, 1.0)
    }

    /// Time left in the current phase at `now`
    pub fn remaining_phase_seconds(&self, now: f64) -> f64 {
        let reference = self.paused_at.unwrap_or(now);
        (self.phase_duration_seconds(self.phase_index) - (reference - self.phase_started_at))
            .max(0.0)
    }

    fn close_pause(&mut self, now: f64) -> f64 {
        match self.paused_at.take() {
            Some(at) => {
                let paused = (now - at).max(0.0);
                self.paused_total += paused;
                paused
            }
            None => 0.0,
        }
    }

    fn finalize(&mut self, now: f64, status: SessionStatus) -> SessionRecord {
        self.close_pause(now);
        self.ended_at = Some(now);
        let wall = chrono::Duration::milliseconds(((now - self.start_clock) * 1000.0).round() as i64);
        let phases_completed = if status == SessionStatus::Completed {
            self.protocol.len()
        } else {
            self.phases_completed
        };
        self.metrics.finalize(
            self.protocol.id(),
            self.started_at,
            self.started_at + wall,
            self.elapsed_at(now),
            status,
            phases_completed,
        )
    }
}

// ============================================================================
// Sequencer
// ============================================================================

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No active session; nothing was pushed
    Inactive(SessionState),
    Running {
        phase_index: usize,
        progress: f64,
        point: TrajectoryPoint,
        phase_changed: bool,
    },
    /// The last phase finished on this tick
    Completed(SessionRecord),
}

/// Result of an emergency stop
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyOutcome {
    pub silence: SilenceReport,
    /// Finalized record, if a session was running
    pub record: Option<SessionRecord>,
}

#[derive(Debug)]
pub struct PhaseSequencer {
    state: SessionState,
    session: Option<Session>,
    settings: SequencerSettings,
    master_volume: f32,
}

impl PhaseSequencer {
    pub fn new(settings: SequencerSettings, master_volume: f32) -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            settings,
            master_volume,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Change the session volume; applied immediately only while active
    pub fn set_master_volume(&mut self, volume: f32, graph: &mut SignalGraph) {
        self.master_volume = volume;
        if self.state == SessionState::Active {
            graph.set_master_volume(volume, self.settings.volume_ramp_seconds);
        }
    }

    pub fn start(
        &mut self,
        protocol: Arc<Protocol>,
        total_duration_seconds: f64,
        now: f64,
        graph: &mut SignalGraph,
    ) -> Result<SessionStartRecord> {
        if self.state != SessionState::Idle {
            return Err(EntrainError::ConcurrentStartFailure {
                state: self.state.to_string(),
            });
        }
        if !(total_duration_seconds.is_finite() && total_duration_seconds > 0.0) {
            return Err(EntrainError::invalid_parameter(
                "total_duration_seconds",
                total_duration_seconds,
                "a positive number of seconds",
            ));
        }
        protocol.validate()?;
        let first = protocol.phase(0).ok_or_else(|| EntrainError::ProtocolInvalid {
            reason: "protocol has no phases".to_string(),
        })?;

        let point = trajectory::evaluate(&first.frequency, 0.0);
        graph.clear_halt();
        graph.set_beat_frequency(clamp_beat_hz(point.beat_hz), point.carrier_hz, 0.0);
        graph.set_master_volume(0.0, 0.0);
        graph.set_master_volume(self.master_volume, self.settings.fade_seconds);

        let id = Uuid::new_v4();
        let mut metrics = MetricsEmitter::new(id);
        metrics.sample(0, &first.tag, 0.0, 0.0);
        let started_at = Utc::now();

        self.state.transition(SessionState::Active, "start")?;
        info!(
            session_id = %id,
            protocol = protocol.id(),
            duration = total_duration_seconds,
            phases = protocol.len(),
            "session started"
        );

        let record = SessionStartRecord {
            session_id: id,
            protocol_id: protocol.id().to_string(),
            protocol_name: protocol.name().to_string(),
            started_at,
            planned_duration_seconds: total_duration_seconds,
        };
        self.session = Some(Session {
            id,
            protocol,
            total_duration_seconds,
            started_at,
            start_clock: now,
            phase_index: 0,
            phase_started_at: now,
            paused_at: None,
            paused_total: 0.0,
            ended_at: None,
            phase_progress: 0.0,
            phases_completed: 0,
            current: point,
            metrics,
        });
        Ok(record)
    }

    pub fn pause(&mut self, now: f64, graph: &mut SignalGraph) -> Result<()> {
        self.state.transition(SessionState::Paused, "pause")?;
        if let Some(session) = self.session.as_mut() {
            session.paused_at = Some(now);
            info!(session_id = %session.id, phase = session.phase_index, "session paused");
        }
        graph.set_master_volume(0.0, self.settings.fade_seconds);
        Ok(())
    }

    pub fn resume(&mut self, now: f64, graph: &mut SignalGraph) -> Result<()> {
        if self.state != SessionState::Paused {
            return Err(EntrainError::InvalidTransition {
                from: self.state.to_string(),
                operation: "resume".to_string(),
            });
        }
        self.state.transition(SessionState::Active, "resume")?;
        if let Some(session) = self.session.as_mut() {
            let paused = session.close_pause(now);
            session.phase_started_at += paused;
            info!(session_id = %session.id, paused_seconds = paused, "session resumed");
        }
        graph.set_master_volume(self.master_volume, self.settings.fade_seconds);
        Ok(())
    }

    /// Stop a running or paused session and finalize it as incomplete
    pub fn stop(&mut self, now: f64, graph: &mut SignalGraph) -> Result<SessionRecord> {
        self.state.transition(SessionState::Stopped, "stop")?;
        graph.set_master_volume(0.0, self.settings.fade_seconds);
        let session = self.session.as_mut().ok_or_else(|| EntrainError::InvalidTransition {
            from: SessionState::Stopped.to_string(),
            operation: "stop".to_string(),
        })?;
        let record = session.finalize(now, SessionStatus::Stopped);
        info!(
            session_id = %record.session_id,
            duration = record.duration_seconds,
            phases_completed = record.phases_completed,
            "session stopped"
        );
        Ok(record)
    }

    /// Silence the graph and, if a session is live, finalize it as incomplete
    ///
    /// The graph is silenced even when the state is already terminal; in that
    /// case the call still reports `InvalidTransition`.
    pub fn emergency_stop(
        &mut self,
        now: f64,
        graph: &mut SignalGraph,
        governor: &SafetyGovernor,
    ) -> Result<EmergencyOutcome> {
        let silence = governor.emergency_silence(graph);
        self.state
            .transition(SessionState::EmergencyStopped, "emergency stop")?;
        let record = self
            .session
            .as_mut()
            .map(|session| session.finalize(now, SessionStatus::EmergencyStopped));
        Ok(EmergencyOutcome { silence, record })
    }

    /// Discard a finalized session and return to `Idle`
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            state if state.is_terminal() => {
                self.state = SessionState::Idle;
                self.session = None;
                debug!("sequencer reset");
                Ok(())
            }
            state => Err(EntrainError::InvalidTransition {
                from: state.to_string(),
                operation: "reset".to_string(),
            }),
        }
    }

    /// Advance phase progress and push the trajectory into the graph
    pub fn tick(&mut self, now: f64, graph: &mut SignalGraph) -> Result<TickOutcome> {
        if self.state != SessionState::Active {
            return Ok(TickOutcome::Inactive(self.state));
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(TickOutcome::Inactive(self.state));
        };

        let mut phase_changed = false;
        let progress = loop {
            let phase_seconds = session.phase_duration_seconds(session.phase_index);
            let elapsed = now - session.phase_started_at;
            let progress = if phase_seconds > 0.0 {
                (elapsed / phase_seconds).clamp(0.0, 1.0)
            } else {
                1.0
            };
            if progress < 1.0 {
                break progress;
            }

            session.phases_completed = session.phase_index + 1;
            if session.phase_index + 1 >= session.protocol.len() {
                session.phase_progress = 1.0;
                self.state.transition(SessionState::Completing, "complete")?;
                graph.set_master_volume(0.0, self.settings.fade_seconds);
                let record = session.finalize(now, SessionStatus::Completed);
                self.state.transition(SessionState::Completed, "complete")?;
                info!(
                    session_id = %record.session_id,
                    duration = record.duration_seconds,
                    "session completed"
                );
                return Ok(TickOutcome::Completed(record));
            }

            session.phase_started_at += phase_seconds;
            session.phase_index += 1;
            phase_changed = true;
            info!(
                session_id = %session.id,
                phase = session.phase_index,
                name = session.current_phase().map(|p| p.name.as_str()).unwrap_or(""),
                "phase advanced"
            );
        };

        let Some(phase) = session.protocol.phase(session.phase_index) else {
            return Ok(TickOutcome::Inactive(self.state));
        };
        let point = trajectory::evaluate(&phase.frequency, progress);
        let beat_hz = clamp_beat_hz(point.beat_hz);
        graph.set_beat_frequency(beat_hz, point.carrier_hz, self.settings.tick_ramp_seconds);

        let elapsed = session.elapsed_at(now);
        let tag = phase.tag.clone();
        session.metrics.sample(session.phase_index, &tag, progress, elapsed);
        session.phase_progress = progress;
        session.current = point;

        debug!(
            phase = session.phase_index,
            progress,
            beat_hz,
            carrier_hz = point.carrier_hz,
            "tick"
        );
        Ok(TickOutcome::Running {
            phase_index: session.phase_index,
            progress,
            point,
            phase_changed,
        })
    }
}
