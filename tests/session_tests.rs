//! Session Integration Tests
//!
//! Lifecycle, timing and emergency-stop behavior of the engine, driven
//! through the public control surface.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use entrain::engine::{AudioBuffer, ManualClock, OutputDevice};
use entrain::protocol::{FrequencySpec, InMemoryProtocolRepository, Phase, Protocol};
use entrain::safety::DailyLimitPolicy;
use entrain::session::{SchedulerExit, SessionState, TickOutcome};
use entrain::trajectory::CarrierBand;
use entrain::{EngineConfig, EntrainError, EntrainmentEngine};

fn config() -> EngineConfig {
    EngineConfig {
        noise_seed: Some(11),
        ..Default::default()
    }
}

/// 100 s, phases [0.4, 0.6]: constant 10 Hz, then 10 -> 4 Hz
fn two_phase() -> Arc<Protocol> {
    Arc::new(
        Protocol::new(
            "two-phase",
            "Two Phase",
            100.0,
            vec![
                Phase::new("hold", 0.4, FrequencySpec::Constant { hz: 10.0 }),
                Phase::new("descend", 0.6, FrequencySpec::Sweep { start: 10.0, end: 4.0 }),
            ],
        )
        .unwrap(),
    )
}

fn manual_engine() -> (EntrainmentEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let engine = EntrainmentEngine::builder(config())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    (engine, clock)
}

// === End-to-End ===

#[test]
fn test_two_phase_timeline() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();

    clock.set(Duration::from_secs(20));
    match engine.tick().unwrap() {
        TickOutcome::Running {
            phase_index, point, ..
        } => {
            assert_eq!(phase_index, 0);
            assert_eq!(point.beat_hz, 10.0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(engine.get_state().current_beat_frequency, 10.0);

    clock.set(Duration::from_secs(70));
    match engine.tick().unwrap() {
        TickOutcome::Running {
            phase_index,
            progress,
            point,
            phase_changed,
        } => {
            assert_eq!(phase_index, 1);
            assert!(phase_changed);
            assert_relative_eq!(progress, 0.5, epsilon = 1e-9);
            assert_relative_eq!(point.beat_hz, 7.0, epsilon = 1e-9);
            assert_eq!(point.band, CarrierBand::Theta);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let snapshot = engine.get_state();
    assert!(snapshot.active);
    assert_eq!(snapshot.current_phase_index, 1);
    assert_relative_eq!(snapshot.session_progress, 0.7, epsilon = 1e-9);
    assert_relative_eq!(snapshot.current_carrier_frequency, 150.0);
}

#[test]
fn test_session_completes_with_full_record() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();
    for _ in 0..10 {
        clock.advance_secs(9.0);
        engine.tick().unwrap();
    }
    clock.set(Duration::from_secs(100));
    let record = match engine.tick().unwrap() {
        TickOutcome::Completed(record) => record,
        other => panic!("expected completion, got {:?}", other),
    };
    assert!(record.completed);
    assert_eq!(record.phases_completed, 2);
    assert_relative_eq!(record.duration_seconds, 100.0, epsilon = 1e-6);
    let average = record.average_metrics.unwrap();
    assert!(average.is_in_range());
    assert_eq!(engine.state(), SessionState::Completed);
    assert_eq!(engine.get_state().master_volume, 0.0);
}

#[test]
fn test_late_tick_does_not_shorten_next_phase() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();
    // First tick after the boundary lands 5 s late
    clock.set(Duration::from_secs(45));
    engine.tick().unwrap();
    let snapshot = engine.get_state();
    assert_eq!(snapshot.current_phase_index, 1);
    assert_relative_eq!(snapshot.phase_progress, 5.0 / 60.0, epsilon = 1e-9);
}

// === Pause / Resume ===

#[test]
fn test_pause_preserves_remaining_phase_time() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();

    clock.set(Duration::from_secs(10));
    engine.tick().unwrap();
    engine.pause().unwrap();
    assert!(engine.get_state().paused);

    // Ticks while paused change nothing
    clock.set(Duration::from_secs(50));
    assert_eq!(
        engine.tick().unwrap(),
        TickOutcome::Inactive(SessionState::Paused)
    );
    engine.resume().unwrap();

    // 10 s into phase 0 before the pause, 10 s after
    clock.set(Duration::from_secs(60));
    engine.tick().unwrap();
    let snapshot = engine.get_state();
    assert_eq!(snapshot.current_phase_index, 0);
    assert_relative_eq!(snapshot.phase_progress, 0.5, epsilon = 1e-9);

    // Phase 0 ends 30 s after resume, not 30 s after the pause
    clock.set(Duration::from_secs(79));
    engine.tick().unwrap();
    assert_eq!(engine.get_state().current_phase_index, 0);
    clock.set(Duration::from_secs(80));
    engine.tick().unwrap();
    assert_eq!(engine.get_state().current_phase_index, 1);
}

// === Transitions ===

#[test]
fn test_invalid_transitions_fail() {
    let (engine, _clock) = manual_engine();
    assert!(matches!(
        engine.pause(),
        Err(EntrainError::InvalidTransition { .. })
    ));
    assert!(engine.resume().is_err());
    assert!(engine.stop().is_err());

    engine.start(two_phase(), 100.0).unwrap();
    assert!(engine.resume().is_err());
    assert!(matches!(
        engine.start(two_phase(), 100.0),
        Err(EntrainError::ConcurrentStartFailure { .. })
    ));

    engine.pause().unwrap();
    assert!(engine.pause().is_err());
    assert!(matches!(
        engine.start(two_phase(), 100.0),
        Err(EntrainError::ConcurrentStartFailure { .. })
    ));
}

#[test]
fn test_stop_twice_returns_failure() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();
    clock.set(Duration::from_secs(30));
    engine.tick().unwrap();

    let record = engine.stop().unwrap();
    assert!(!record.completed);
    assert_eq!(record.phases_completed, 0);
    assert_eq!(engine.state(), SessionState::Stopped);

    let err = engine.stop().unwrap_err();
    assert_eq!(err.error_code(), "INVALID_TRANSITION");
    assert_eq!(engine.state(), SessionState::Stopped);
}

#[test]
fn test_progress_frozen_after_stop() {
    let (engine, clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();
    clock.set(Duration::from_secs(10));
    engine.tick().unwrap();
    engine.stop().unwrap();
    assert_relative_eq!(engine.get_state().session_progress, 0.1, epsilon = 1e-9);

    clock.set(Duration::from_secs(80));
    assert_relative_eq!(engine.get_state().session_progress, 0.1, epsilon = 1e-9);
}

#[test]
fn test_reset_allows_new_session() {
    let (engine, _clock) = manual_engine();
    engine.start(two_phase(), 100.0).unwrap();
    engine.stop().unwrap();
    engine.reset().unwrap();
    assert_eq!(engine.state(), SessionState::Idle);
    engine.start(two_phase(), 100.0).unwrap();
    assert_eq!(engine.state(), SessionState::Active);
}

#[test]
fn test_start_builtin_protocol() {
    let (engine, _clock) = manual_engine();
    let repository = InMemoryProtocolRepository::with_builtins().unwrap();
    let record = engine
        .start_protocol(&repository, "calm-alpha", Some(600.0))
        .unwrap();
    assert_eq!(record.protocol_id, "calm-alpha");
    assert_eq!(record.planned_duration_seconds, 600.0);
    assert!(matches!(
        engine.start_protocol(&repository, "missing", None),
        Err(EntrainError::ProtocolNotFound { .. })
    ));
}

// === Emergency Stop ===

#[test]
fn test_emergency_stop_cancels_every_ramp() {
    let (engine, clock) = manual_engine();
    engine.activate_output();
    engine.start(two_phase(), 100.0).unwrap();
    engine.set_beat_frequency(20.0, 5.0, None).unwrap();
    engine.set_spatial_position(0.8, 4.0).unwrap();
    engine
        .start_ambient_noise(entrain::dsp::NoiseType::Brown, 0.4)
        .unwrap();
    engine.render_block(480).unwrap();
    clock.set(Duration::from_secs(1));

    let call_time = engine.audio_time();
    let report = engine.emergency_stop().unwrap();
    assert!(report.cancelled_ramps >= 3);
    assert_eq!(report.silenced_at, call_time);
    assert!(report.device_error.is_none());
    assert!(report.latency < Duration::from_millis(100));
    assert!(!report.record.unwrap().completed);

    assert_eq!(engine.with_graph(|g| g.latest_scheduled_end()), None);
    assert_eq!(engine.with_graph(|g| g.master_gain_now()), 0.0);
    assert_eq!(engine.state(), SessionState::EmergencyStopped);

    let block = engine.render_block(4800).unwrap();
    assert_eq!(block.peak(), 0.0);

    assert!(engine.resume().is_err());
    assert!(engine.tick().is_ok());
}

#[test]
fn test_emergency_stop_from_idle() {
    let (engine, _clock) = manual_engine();
    let report = engine.emergency_stop().unwrap();
    assert!(report.session_id.is_none());
    assert!(report.record.is_none());
    assert_eq!(engine.state(), SessionState::EmergencyStopped);
}

struct BrokenDevice;

impl OutputDevice for BrokenDevice {
    fn name(&self) -> &str {
        "broken"
    }

    fn write(&mut self, _block: &AudioBuffer) -> entrain::Result<()> {
        Ok(())
    }

    fn silence(&mut self) -> entrain::Result<()> {
        Err(EntrainError::DeviceUnavailable {
            reason: "unplugged".to_string(),
        })
    }
}

#[test]
fn test_emergency_stop_reports_device_failure_separately() {
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_output(Box::new(BrokenDevice))
        .build()
        .unwrap();
    engine.start(two_phase(), 100.0).unwrap();

    let report = engine.emergency_stop().unwrap();
    assert!(report.device_error.unwrap().contains("unplugged"));
    assert_eq!(engine.state(), SessionState::EmergencyStopped);
}

// === Policy ===

#[test]
fn test_policy_limits_sessions() {
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_policy(Arc::new(DailyLimitPolicy::new(1, 1800.0)))
        .build()
        .unwrap();

    assert!(matches!(
        engine.start(two_phase(), 3600.0),
        Err(EntrainError::PolicyDenied { .. })
    ));
    engine.start(two_phase(), 100.0).unwrap();
    engine.stop().unwrap();
    engine.reset().unwrap();

    let err = engine.start(two_phase(), 100.0).unwrap_err();
    assert_eq!(err.error_code(), "POLICY_DENIED");
    assert_eq!(engine.state(), SessionState::Idle);
}

#[test]
fn test_start_while_active_ignores_policy() {
    let engine = EntrainmentEngine::builder(config())
        .with_clock(Arc::new(ManualClock::new()))
        .with_policy(Arc::new(DailyLimitPolicy::new(1, 1800.0)))
        .build()
        .unwrap();
    engine.start(two_phase(), 100.0).unwrap();

    let err = engine.start(two_phase(), 100.0).unwrap_err();
    assert_eq!(err.error_code(), "CONCURRENT_START_FAILURE");
    assert_eq!(engine.state(), SessionState::Active);
}

// === Scheduler ===

fn short_protocol() -> Arc<Protocol> {
    Arc::new(
        Protocol::new(
            "short",
            "Short",
            2.0,
            vec![
                Phase::new("up", 0.5, FrequencySpec::Sweep { start: 6.0, end: 12.0 }),
                Phase::new("down", 0.5, FrequencySpec::Sweep { start: 12.0, end: 6.0 }),
            ],
        )
        .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_session_to_completion() {
    let engine = EntrainmentEngine::new(config()).unwrap();
    engine.start(short_protocol(), 2.0).unwrap();
    let handle = engine.spawn_scheduler().unwrap();

    assert_eq!(handle.join().await, SchedulerExit::Completed);
    assert_eq!(engine.state(), SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ends_with_stopped_session() {
    let engine = EntrainmentEngine::new(config()).unwrap();
    engine.start(short_protocol(), 2.0).unwrap();
    let handle = engine.spawn_scheduler().unwrap();

    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(engine.get_state().current_phase_index, 0);
    engine.stop().unwrap();

    assert_eq!(
        handle.join().await,
        SchedulerExit::Ended(SessionState::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_running_while_paused() {
    let engine = EntrainmentEngine::new(config()).unwrap();
    engine.start(short_protocol(), 2.0).unwrap();
    let handle = engine.spawn_scheduler().unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    engine.pause().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!handle.is_finished());
    assert_eq!(engine.get_state().current_phase_index, 0);

    engine.resume().unwrap();
    assert_eq!(handle.join().await, SchedulerExit::Completed);
}

#[test]
fn test_scheduler_requires_session() {
    let engine = EntrainmentEngine::new(config()).unwrap();
    assert!(engine.spawn_scheduler().is_err());
}
