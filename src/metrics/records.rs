//! Metrics samples and session records handed to persistence

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five simulated cognitive dimensions, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CognitiveMetrics {
    pub coherence: f64,
    pub focus: f64,
    pub arousal: f64,
    pub load: f64,
    pub valence: f64,
}

impl CognitiveMetrics {
    pub const fn new(coherence: f64, focus: f64, arousal: f64, load: f64, valence: f64) -> Self {
        Self {
            coherence,
            focus,
            arousal,
            load,
            valence,
        }
    }

    pub fn values(&self) -> [f64; 5] {
        [self.coherence, self.focus, self.arousal, self.load, self.valence]
    }

    pub fn from_values(values: [f64; 5]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }

    /// Arithmetic mean of a set of samples
    pub fn mean<'a>(samples: impl IntoIterator<Item = &'a CognitiveMetrics>) -> Option<Self> {
        let mut sums = [0.0_f64; 5];
        let mut count = 0usize;
        for sample in samples {
            for (sum, value) in sums.iter_mut().zip(sample.values()) {
                *sum += value;
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Self::from_values(sums.map(|s| s / count as f64)))
    }

    pub fn is_in_range(&self) -> bool {
        self.values().iter().all(|v| (0.0..=1.0).contains(v))
    }
}

/// One timestamped, phase-tagged metrics sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveMetricsSample {
    pub timestamp: DateTime<Utc>,
    /// Session time (pauses excluded) at which the sample was taken
    pub elapsed_seconds: f64,
    pub phase_index: usize,
    pub phase_tag: String,
    #[serde(flatten)]
    pub metrics: CognitiveMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Stopped,
    EmergencyStopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::EmergencyStopped => write!(f, "emergency_stopped"),
        }
    }
}

/// Emitted when a session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStartRecord {
    pub session_id: Uuid,
    pub protocol_id: String,
    pub protocol_name: String,
    pub started_at: DateTime<Utc>,
    pub planned_duration_seconds: f64,
}

/// Finalized summary of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub protocol_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Active session time, pauses excluded
    pub duration_seconds: f64,
    pub completed: bool,
    pub status: SessionStatus,
    pub phases_completed: usize,
    pub final_metrics: Option<CognitiveMetrics>,
    pub average_metrics: Option<CognitiveMetrics>,
    pub sample_count: usize,
}

/// Anything the persistence collaborator accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistenceRecord {
    SessionStart(SessionStartRecord),
    SessionEnd(SessionRecord),
}

impl PersistenceRecord {
    pub fn session_id(&self) -> Uuid {
        match self {
            PersistenceRecord::SessionStart(r) => r.session_id,
            PersistenceRecord::SessionEnd(r) => r.session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceRecord::SessionStart(_) => "start",
            PersistenceRecord::SessionEnd(_) => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean() {
        let samples = [
            CognitiveMetrics::new(0.2, 0.4, 0.6, 0.8, 1.0),
            CognitiveMetrics::new(0.4, 0.6, 0.8, 1.0, 0.0),
        ];
        let mean = CognitiveMetrics::mean(&samples).unwrap();
        assert_relative_eq!(mean.coherence, 0.3);
        assert_relative_eq!(mean.valence, 0.5);
        assert!(CognitiveMetrics::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn test_record_tagging() {
        let record = PersistenceRecord::SessionStart(SessionStartRecord {
            session_id: Uuid::new_v4(),
            protocol_id: "calm-alpha".to_string(),
            protocol_name: "Calm Alpha".to_string(),
            started_at: Utc::now(),
            planned_duration_seconds: 600.0,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "session_start");
        assert_eq!(record.kind(), "start");
    }
}
