//! Entrainment engine
//!
//! [`EntrainmentEngine`] is the control surface a host application talks to.
//! It owns one [`PhaseSequencer`], one [`SignalGraph`], the [`SafetyGovernor`]
//! and the persistence hand-off; there is no global instance, and any number
//! of engines can coexist. The handle is cheap to clone and every clone
//! controls the same engine.
//!
//! Locks are always taken in the order sequencer, graph, output device. No
//! control operation blocks on I/O: persistence goes through the
//! [`PersistenceDispatcher`] and rendering happens in [`render_block`].
//!
//! [`render_block`]: EntrainmentEngine::render_block

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::buffer::AudioBuffer;
use super::clock::{MonotonicClock, SessionClock};
use super::output::OutputDevice;
use crate::config::EngineConfig;
use crate::dsp::{AnalysisTap, NoiseLayerState, NoiseType, SignalGraph, TimbrePreset};
use crate::error::{EntrainError, Result};
use crate::metrics::{CognitiveMetrics, PersistenceRecord, SessionRecord, SessionStartRecord};
use crate::protocol::{Protocol, ProtocolRepository};
use crate::safety::{PolicyRequest, SafetyGovernor, SessionPolicy};
use crate::session::{
    spawn_scheduler, PhaseSequencer, SchedulerHandle, SequencerSettings, SessionState, TickOutcome,
};
use crate::state::{PersistenceDispatcher, SessionStore, Spool};
use crate::trajectory::CarrierBand;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Reports
// ============================================================================

/// Read-only view of the engine for visualization consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub state: SessionState,
    pub active: bool,
    pub paused: bool,
    pub session_id: Option<Uuid>,
    pub protocol_id: Option<String>,
    pub current_phase_index: usize,
    pub current_phase_name: Option<String>,
    pub phase_progress: f64,
    pub session_progress: f64,
    pub current_beat_frequency: f64,
    pub current_carrier_frequency: f64,
    pub carrier_band: CarrierBand,
    pub master_volume: f32,
    pub preset: TimbrePreset,
    pub isochronic: bool,
    pub spatial_position: f32,
    pub noise: Vec<NoiseLayerState>,
    pub output_active: bool,
    pub metrics: Option<CognitiveMetrics>,
}

/// What an emergency stop did
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyStopReport {
    pub session_id: Option<Uuid>,
    /// Wall time spent between the call and silenced output
    pub latency: Duration,
    pub cancelled_ramps: usize,
    /// Audio-clock time the master gain reached zero
    pub silenced_at: f64,
    /// Failure of the output device mute, reported separately
    pub device_error: Option<String>,
    pub record: Option<SessionRecord>,
}

// ============================================================================
// Builder
// ============================================================================

pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn SessionClock>>,
    policy: Option<Arc<dyn SessionPolicy>>,
    store: Option<Arc<dyn SessionStore>>,
    spool_dir: Option<PathBuf>,
    output: Option<Box<dyn OutputDevice>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        let spool_dir = config.spool_dir.clone();
        Self {
            config,
            clock: None,
            policy: None,
            store: None,
            spool_dir,
            output: None,
        }
    }

    /// Session clock; defaults to [`MonotonicClock`]
    pub fn with_clock(mut self, clock: Arc<dyn SessionClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn SessionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Persistence collaborator for start and end records
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Spool directory for records the store rejects
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, output: Box<dyn OutputDevice>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> Result<EntrainmentEngine> {
        self.config.validate()?;
        let mut governor = SafetyGovernor::new(self.config.volume_ceiling)?;
        if let Some(policy) = self.policy {
            governor = governor.with_policy(policy);
        }

        let mut graph = SignalGraph::new(&self.config)?;
        graph.set_master_volume(0.0, 0.0);
        let tap = graph.analysis_tap();

        let sequencer = PhaseSequencer::new(
            SequencerSettings::from(&self.config),
            governor.cap_volume(self.config.master_volume),
        );

        let persistence = match self.store {
            Some(store) => Some(PersistenceDispatcher::new(
                store,
                self.spool_dir.map(Spool::new),
            )?),
            None => None,
        };

        let clock: Arc<dyn SessionClock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };

        info!(
            sample_rate = self.config.sample_rate,
            layers = self.config.harmonic_layers,
            ceiling = self.config.volume_ceiling,
            "engine initialized"
        );

        Ok(EntrainmentEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                governor,
                clock,
                sequencer: Mutex::new(sequencer),
                graph: Mutex::new(graph),
                output: Mutex::new(self.output),
                persistence,
                tap,
            }),
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    config: EngineConfig,
    governor: SafetyGovernor,
    clock: Arc<dyn SessionClock>,
    sequencer: Mutex<PhaseSequencer>,
    graph: Mutex<SignalGraph>,
    output: Mutex<Option<Box<dyn OutputDevice>>>,
    persistence: Option<PersistenceDispatcher>,
    tap: AnalysisTap,
}

#[derive(Clone)]
pub struct EntrainmentEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for EntrainmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrainmentEngine")
            .field("state", &self.state())
            .field("persistence", &self.inner.persistence.is_some())
            .finish()
    }
}

impl EntrainmentEngine {
    /// Engine with a monotonic clock and no collaborators
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn governor(&self) -> &SafetyGovernor {
        &self.inner.governor
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner.sequencer).state()
    }

    fn now(&self) -> f64 {
        self.inner.clock.now_secs()
    }

    fn submit(&self, record: PersistenceRecord) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.submit(record);
        }
    }

    /// Block until every submitted record has been handled
    pub fn flush_persistence(&self) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.flush();
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a session running `protocol` over `duration_seconds`
    pub fn start(
        &self,
        protocol: Arc<Protocol>,
        duration_seconds: f64,
    ) -> Result<SessionStartRecord> {
        let request = PolicyRequest {
            protocol_id: protocol.id().to_string(),
            duration_seconds,
            requested_at: Utc::now(),
        };
        let record = {
            let mut sequencer = lock(&self.inner.sequencer);
            let state = sequencer.state();
            if state != SessionState::Idle {
                return Err(EntrainError::ConcurrentStartFailure {
                    state: state.to_string(),
                });
            }
            self.inner.governor.check_policy(&request)?;
            let mut graph = lock(&self.inner.graph);
            sequencer.start(protocol, duration_seconds, self.now(), &mut graph)?
        };
        self.inner.governor.record_start(&request);
        self.submit(PersistenceRecord::SessionStart(record.clone()));
        Ok(record)
    }

    /// Fetch a protocol from `repository` and start it
    ///
    /// Without an explicit duration the protocol's own total duration is used.
    pub fn start_protocol(
        &self,
        repository: &dyn ProtocolRepository,
        id: &str,
        duration_seconds: Option<f64>,
    ) -> Result<SessionStartRecord> {
        let protocol = repository.get(id)?;
        let duration = duration_seconds.unwrap_or_else(|| protocol.total_duration_seconds());
        self.start(protocol, duration)
    }

    pub fn pause(&self) -> Result<()> {
        let mut sequencer = lock(&self.inner.sequencer);
        let mut graph = lock(&self.inner.graph);
        sequencer.pause(self.now(), &mut graph)
    }

    pub fn resume(&self) -> Result<()> {
        let mut sequencer = lock(&self.inner.sequencer);
        let mut graph = lock(&self.inner.graph);
        sequencer.resume(self.now(), &mut graph)
    }

    /// Stop the session and hand the incomplete record to persistence
    pub fn stop(&self) -> Result<SessionRecord> {
        let record = {
            let mut sequencer = lock(&self.inner.sequencer);
            let mut graph = lock(&self.inner.graph);
            sequencer.stop(self.now(), &mut graph)?
        };
        self.submit(PersistenceRecord::SessionEnd(record.clone()));
        Ok(record)
    }

    /// Silence everything now and end the session
    ///
    /// The graph and the output device are silenced before the state check,
    /// so a call from a terminal state still mutes output and then returns
    /// `InvalidTransition`. A device failure does not stop the state change;
    /// it is returned in [`EmergencyStopReport::device_error`].
    pub fn emergency_stop(&self) -> Result<EmergencyStopReport> {
        let started = Instant::now();
        let (outcome, session_id) = {
            let mut sequencer = lock(&self.inner.sequencer);
            let mut graph = lock(&self.inner.graph);
            let session_id = sequencer.session().map(|s| s.id());
            let outcome = sequencer.emergency_stop(self.now(), &mut graph, &self.inner.governor);
            (outcome, session_id)
        };

        let device_error = {
            let mut output = lock(&self.inner.output);
            match output.as_mut().map(|device| device.silence()) {
                Some(Err(e)) => {
                    error!(error = %e, "output device could not be silenced");
                    Some(e.to_string())
                }
                _ => None,
            }
        };
        let latency = started.elapsed();

        let outcome = outcome?;
        if let Some(record) = &outcome.record {
            self.submit(PersistenceRecord::SessionEnd(record.clone()));
        }
        error!(
            session_id = ?session_id,
            latency_us = latency.as_micros() as u64,
            cancelled_ramps = outcome.silence.cancelled_ramps,
            "emergency stop complete"
        );
        Ok(EmergencyStopReport {
            session_id,
            latency,
            cancelled_ramps: outcome.silence.cancelled_ramps,
            silenced_at: outcome.silence.silenced_at,
            device_error,
            record: outcome.record,
        })
    }

    /// Return a finished engine to `Idle`
    pub fn reset(&self) -> Result<()> {
        lock(&self.inner.sequencer).reset()?;
        if let Some(device) = lock(&self.inner.output).as_mut() {
            device.unmute();
        }
        Ok(())
    }

    /// Run one sequencer tick at the current session-clock time
    pub fn tick(&self) -> Result<TickOutcome> {
        self.tick_session(None)
    }

    fn tick_session(&self, expected: Option<Uuid>) -> Result<TickOutcome> {
        let outcome = {
            let mut sequencer = lock(&self.inner.sequencer);
            if let Some(expected) = expected {
                if sequencer.session().map(|s| s.id()) != Some(expected) {
                    return Ok(TickOutcome::Inactive(SessionState::Idle));
                }
            }
            let mut graph = lock(&self.inner.graph);
            sequencer.tick(self.now(), &mut graph)?
        };
        if let TickOutcome::Completed(record) = &outcome {
            self.submit(PersistenceRecord::SessionEnd(record.clone()));
        }
        Ok(outcome)
    }

    /// Drive the current session from a tokio task on the configured interval
    ///
    /// The task is bound to the session running at spawn time and ends with
    /// it. Requires a tokio runtime.
    pub fn spawn_scheduler(&self) -> Result<SchedulerHandle> {
        let session_id = lock(&self.inner.sequencer)
            .session()
            .map(|s| s.id())
            .ok_or_else(|| EntrainError::InvalidTransition {
                from: SessionState::Idle.to_string(),
                operation: "schedule".to_string(),
            })?;
        let engine = self.clone();
        let interval = Duration::from_millis(self.inner.config.tick_interval_ms);
        debug!(%session_id, interval_ms = self.inner.config.tick_interval_ms, "spawning scheduler");
        spawn_scheduler(interval, move || engine.tick_session(Some(session_id)))
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Ramp to a caller-chosen beat frequency
    ///
    /// Values outside 0.5..=40 Hz are rejected; accepted values reach the
    /// graph unchanged. Without a band the carrier follows the beat.
    pub fn set_beat_frequency(
        &self,
        beat_hz: f64,
        ramp_seconds: f64,
        band: Option<CarrierBand>,
    ) -> Result<()> {
        let beat_hz = self.inner.governor.validate_beat_frequency(beat_hz)?;
        let ramp = validate_ramp("ramp_seconds", ramp_seconds)?;
        let band = band.unwrap_or_else(|| CarrierBand::for_beat(beat_hz));
        lock(&self.inner.graph).set_beat_frequency(beat_hz, band.carrier_hz(), ramp);
        debug!(beat_hz, %band, ramp, "beat frequency set");
        Ok(())
    }

    pub fn set_preset(&self, name: &str) -> Result<()> {
        let preset = TimbrePreset::from_name(name).ok_or_else(|| {
            EntrainError::invalid_parameter(
                "preset",
                name,
                "one of warm, bright, deep, ethereal, natural",
            )
        })?;
        lock(&self.inner.graph).set_preset(preset, self.inner.config.transition_ramp_seconds);
        info!(%preset, "preset changed");
        Ok(())
    }

    pub fn set_isochronic_pulse(&self, enabled: bool, intensity: f32) -> Result<()> {
        let intensity = self.inner.governor.validate_unit("intensity", intensity)?;
        lock(&self.inner.graph).set_isochronic(
            enabled,
            intensity,
            self.inner.config.default_ramp_seconds,
        );
        debug!(enabled, intensity, "isochronic pulse set");
        Ok(())
    }

    pub fn set_spatial_position(&self, position: f32, ramp_seconds: f64) -> Result<()> {
        if position.is_nan() || !(-1.0..=1.0).contains(&position) {
            return Err(EntrainError::invalid_parameter(
                "spatial_position",
                position,
                "-1.0 to 1.0",
            ));
        }
        let ramp = validate_ramp("ramp_seconds", ramp_seconds)?;
        lock(&self.inner.graph).set_spatial_position(position, ramp);
        Ok(())
    }

    /// Fade a noise layer in over the configured noise fade
    pub fn start_ambient_noise(&self, noise_type: NoiseType, volume: f32) -> Result<()> {
        let volume = self.inner.governor.validate_unit("noise_volume", volume)?;
        lock(&self.inner.graph).start_noise(
            noise_type,
            volume,
            self.inner.config.noise_fade_seconds,
        );
        info!(%noise_type, volume, "ambient noise started");
        Ok(())
    }

    /// Fade a noise layer out; `Ok(false)` when it was not running
    pub fn stop_ambient_noise(&self, noise_type: NoiseType, fade_seconds: f64) -> Result<bool> {
        let fade = validate_ramp("fade_seconds", fade_seconds)?;
        let stopped = lock(&self.inner.graph).stop_noise(noise_type, fade);
        if stopped {
            info!(%noise_type, fade, "ambient noise stopping");
        }
        Ok(stopped)
    }

    /// Set the session volume, capped at the safety ceiling; returns the applied value
    pub fn set_master_volume(&self, volume: f32) -> f32 {
        let volume = self.inner.governor.cap_volume(volume);
        let mut sequencer = lock(&self.inner.sequencer);
        let mut graph = lock(&self.inner.graph);
        sequencer.set_master_volume(volume, &mut graph);
        volume
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Open the output gate; the graph renders silence until then
    pub fn activate_output(&self) {
        lock(&self.inner.graph).activate_output();
    }

    pub fn analysis_tap(&self) -> AnalysisTap {
        self.inner.tap.clone()
    }

    /// Render `frames` frames and pass them to the output device, if any
    pub fn render_block(&self, frames: usize) -> Result<AudioBuffer> {
        let block = lock(&self.inner.graph).render_block(frames);
        if let Some(device) = lock(&self.inner.output).as_mut() {
            device.write(&block).map_err(|e| EntrainError::DeviceUnavailable {
                reason: format!("{}: {}", device.name(), e),
            })?;
        }
        Ok(block)
    }

    /// Flush and close the output device
    pub fn finish_output(&self) -> Result<()> {
        match lock(&self.inner.output).as_mut() {
            Some(device) => device.finish(),
            None => Ok(()),
        }
    }

    /// Audio-clock time in seconds
    pub fn audio_time(&self) -> f64 {
        lock(&self.inner.graph).now()
    }

    /// Run `f` against the graph while holding its lock
    pub fn with_graph<R>(&self, f: impl FnOnce(&SignalGraph) -> R) -> R {
        f(&lock(&self.inner.graph))
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn get_state(&self) -> EngineSnapshot {
        let now = self.now();
        let sequencer = lock(&self.inner.sequencer);
        let graph = lock(&self.inner.graph);
        let state = sequencer.state();
        let session = sequencer.session();
        let beat_hz = graph.beat_frequency();

        EngineSnapshot {
            state,
            active: state == SessionState::Active,
            paused: state == SessionState::Paused,
            session_id: session.map(|s| s.id()),
            protocol_id: session.map(|s| s.protocol().id().to_string()),
            current_phase_index: session.map_or(0, |s| s.phase_index()),
            current_phase_name: session
                .and_then(|s| s.current_phase())
                .map(|p| p.name.clone()),
            phase_progress: session.map_or(0.0, |s| s.phase_progress()),
            session_progress: session.map_or(0.0, |s| s.session_progress_at(now)),
            current_beat_frequency: beat_hz,
            current_carrier_frequency: graph.carrier_frequency(),
            carrier_band: CarrierBand::for_beat(beat_hz),
            master_volume: graph.master_volume(),
            preset: graph.preset(),
            isochronic: graph.isochronic_enabled(),
            spatial_position: graph.spatial_position(),
            noise: graph.noise_states(),
            output_active: graph.is_output_active(),
            metrics: session
                .and_then(|s| s.metrics().latest())
                .map(|sample| sample.metrics),
        }
    }
}

fn validate_ramp(param: &str, seconds: f64) -> Result<f64> {
    if !(seconds.is_finite() && seconds >= 0.0) {
        warn!(param, seconds, "rejected ramp duration");
        return Err(EntrainError::invalid_parameter(
            param,
            seconds,
            "a non-negative number of seconds",
        ));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ManualClock;
    use crate::protocol::{FrequencySpec, Phase};
    use crate::state::MemoryStore;
    use approx::assert_relative_eq;

    fn config() -> EngineConfig {
        EngineConfig {
            noise_seed: Some(3),
            ..Default::default()
        }
    }

    fn protocol() -> Arc<Protocol> {
        Arc::new(
            Protocol::new(
                "two-step",
                "Two Step",
                100.0,
                vec![
                    Phase::new("settle", 0.4, FrequencySpec::Constant { hz: 10.0 }),
                    Phase::new("descend", 0.6, FrequencySpec::Sweep { start: 10.0, end: 4.0 }),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_idle_engine_is_silent() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        engine.activate_output();
        let block = engine.render_block(480).unwrap();
        assert_eq!(block.peak(), 0.0);
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn test_beat_frequency_validation() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        assert!(engine.set_beat_frequency(0.4, 0.1, None).is_err());
        assert!(engine.set_beat_frequency(40.5, 0.1, None).is_err());
        engine.set_beat_frequency(7.83, 0.1, None).unwrap();
        let snapshot = engine.get_state();
        assert_eq!(snapshot.current_beat_frequency, 7.83);
        assert_eq!(snapshot.carrier_band, CarrierBand::Theta);
        assert_relative_eq!(snapshot.current_carrier_frequency, 150.0);
    }

    #[test]
    fn test_explicit_band_overrides_carrier() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        engine
            .set_beat_frequency(6.0, 0.0, Some(CarrierBand::Gamma))
            .unwrap();
        assert_relative_eq!(engine.get_state().current_carrier_frequency, 300.0);
    }

    #[test]
    fn test_master_volume_capped() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        assert_eq!(engine.set_master_volume(2.0), 0.8);
        assert_eq!(engine.set_master_volume(0.3), 0.3);
    }

    #[test]
    fn test_parameter_validation() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        assert!(engine.set_preset("loud").is_err());
        engine.set_preset("Deep").unwrap();
        assert_eq!(engine.get_state().preset, TimbrePreset::Deep);
        assert!(engine.set_isochronic_pulse(true, 1.5).is_err());
        assert!(engine.set_spatial_position(1.2, 0.5).is_err());
        assert!(engine.set_spatial_position(0.5, -1.0).is_err());
        assert!(engine.start_ambient_noise(NoiseType::Pink, 1.1).is_err());
    }

    #[test]
    fn test_records_handed_to_store() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new());
        let engine = EntrainmentEngine::builder(config())
            .with_clock(clock.clone())
            .with_store(store.clone())
            .build()
            .unwrap();

        engine.start(protocol(), 100.0).unwrap();
        clock.advance_secs(30.0);
        engine.tick().unwrap();
        let record = engine.stop().unwrap();
        assert!(!record.completed);
        engine.flush_persistence();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), "start");
        assert_eq!(records[1].kind(), "end");
    }

    #[test]
    fn test_emergency_stop_from_terminal_state_still_silences() {
        let engine = EntrainmentEngine::new(config()).unwrap();
        engine.start(protocol(), 100.0).unwrap();
        engine.stop().unwrap();
        let err = engine.emergency_stop().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert!(engine.with_graph(|g| g.is_halted()));
        assert_eq!(engine.get_state().master_volume, 0.0);
    }
}
