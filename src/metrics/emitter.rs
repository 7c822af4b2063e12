//! Metrics emitter
//!
//! Produces the simulated cognitive metrics that accompany a session: a
//! per-phase baseline plus a small sinusoidal drift over the phase's
//! progress. Samples accumulate for the whole session and are reduced to
//! final and mean values when the session is finalized.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::records::{
    CognitiveMetrics, CognitiveMetricsSample, SessionRecord, SessionStatus,
};

/// Amplitude of the progress-dependent drift
pub const PERTURBATION: f64 = 0.05;

/// Baselines by phase index, cycled for longer protocols
const PHASE_BASELINES: [CognitiveMetrics; 4] = [
    CognitiveMetrics::new(0.55, 0.50, 0.45, 0.40, 0.55),
    CognitiveMetrics::new(0.65, 0.62, 0.50, 0.45, 0.60),
    CognitiveMetrics::new(0.72, 0.70, 0.48, 0.50, 0.65),
    CognitiveMetrics::new(0.68, 0.60, 0.40, 0.42, 0.70),
];

/// Phase offsets so the five dimensions do not move in lockstep
const DRIFT_OFFSETS: [f64; 5] = [0.0, 0.9, 1.8, 2.7, 3.6];

/// Baseline for a phase
pub fn baseline(phase_index: usize) -> CognitiveMetrics {
    PHASE_BASELINES[phase_index % PHASE_BASELINES.len()]
}

/// Deterministic metrics for a phase at `progress`
pub fn simulate(phase_index: usize, progress: f64) -> CognitiveMetrics {
    let base = baseline(phase_index).values();
    let p = progress.clamp(0.0, 1.0);
    let mut values = [0.0; 5];
    for (i, value) in values.iter_mut().enumerate() {
        let drift = PERTURBATION * (TAU * p + DRIFT_OFFSETS[i]).sin();
        *value = (base[i] + drift).clamp(0.0, 1.0);
    }
    CognitiveMetrics::from_values(values)
}

#[derive(Debug, Clone)]
pub struct MetricsEmitter {
    session_id: Uuid,
    samples: Vec<CognitiveMetricsSample>,
}

impl MetricsEmitter {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            samples: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Take a sample for the current tick
    pub fn sample(
        &mut self,
        phase_index: usize,
        phase_tag: &str,
        progress: f64,
        elapsed_seconds: f64,
    ) -> &CognitiveMetricsSample {
        let sample = CognitiveMetricsSample {
            timestamp: Utc::now(),
            elapsed_seconds,
            phase_index,
            phase_tag: phase_tag.to_string(),
            metrics: simulate(phase_index, progress),
        };
        self.samples.push(sample);
        &self.samples[self.samples.len() - 1]
    }

    pub fn samples(&self) -> &[CognitiveMetricsSample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&CognitiveMetricsSample> {
        self.samples.last()
    }

    pub fn average(&self) -> Option<CognitiveMetrics> {
        CognitiveMetrics::mean(self.samples.iter().map(|s| &s.metrics))
    }

    /// Reduce the samples into a finalized record
    pub fn finalize(
        &self,
        protocol_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        duration_seconds: f64,
        status: SessionStatus,
        phases_completed: usize,
    ) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id,
            protocol_id: protocol_id.to_string(),
            started_at,
            ended_at,
            duration_seconds,
            completed: status == SessionStatus::Completed,
            status,
            phases_completed,
            final_metrics: self.latest().map(|s| s.metrics),
            average_metrics: self.average(),
            sample_count: self.samples.len(),
        }
    }
}
