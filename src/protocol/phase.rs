//! Phase and Protocol data model
//!
//! A [`Protocol`] is an ordered, immutable list of [`Phase`]s plus a total
//! duration. Phase durations are fractions of the total and must sum to 1.

use serde::{Deserialize, Serialize};

use crate::error::{EntrainError, Result};
use crate::safety::{MAX_BEAT_HZ, MIN_BEAT_HZ};

/// Tolerance for the phase duration sum
pub const DURATION_EPSILON: f64 = 1e-6;

/// How the beat frequency evolves across a phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrequencySpec {
    /// Fixed beat frequency
    Constant { hz: f64 },
    /// Linear sweep from `start` to `end`
    Sweep { start: f64, end: f64 },
    /// Piecewise-linear sweep `start -> mid -> end`, split at half the phase
    ThreePoint { start: f64, mid: f64, end: f64 },
}

impl FrequencySpec {
    /// All frequency control points of this spec
    pub fn control_points(&self) -> Vec<f64> {
        match *self {
            FrequencySpec::Constant { hz } => vec![hz],
            FrequencySpec::Sweep { start, end } => vec![start, end],
            FrequencySpec::ThreePoint { start, mid, end } => vec![start, mid, end],
        }
    }

    /// Beat frequency at the start of the phase
    pub fn initial_hz(&self) -> f64 {
        match *self {
            FrequencySpec::Constant { hz } => hz,
            FrequencySpec::Sweep { start, .. } | FrequencySpec::ThreePoint { start, .. } => start,
        }
    }
}

/// One timed segment of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// Fraction of the total session time (0 to 1)
    pub duration: f64,
    pub frequency: FrequencySpec,
    /// Target intensity (0 to 1)
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    /// Display tag for visualization consumers
    #[serde(default)]
    pub tag: String,
}

fn default_intensity() -> f64 {
    0.5
}

impl Phase {
    pub fn new(name: impl Into<String>, duration: f64, frequency: FrequencySpec) -> Self {
        let name = name.into();
        Self {
            tag: name.to_lowercase(),
            name,
            duration,
            frequency,
            intensity: default_intensity(),
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !(self.duration > 0.0 && self.duration <= 1.0) {
            return Err(EntrainError::ProtocolInvalid {
                reason: format!(
                    "phase {} '{}' has duration {} (expected 0 < d <= 1)",
                    index, self.name, self.duration
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(EntrainError::ProtocolInvalid {
                reason: format!(
                    "phase {} '{}' has intensity {} (expected 0 to 1)",
                    index, self.name, self.intensity
                ),
            });
        }
        for hz in self.frequency.control_points() {
            if !(MIN_BEAT_HZ..=MAX_BEAT_HZ).contains(&hz) {
                return Err(EntrainError::ProtocolInvalid {
                    reason: format!(
                        "phase {} '{}' uses {} Hz (expected {} to {} Hz)",
                        index, self.name, hz, MIN_BEAT_HZ, MAX_BEAT_HZ
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Ordered immutable list of phases with a total duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    total_duration_seconds: f64,
    phases: Vec<Phase>,
}

impl Protocol {
    /// Build and validate a protocol
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        total_duration_seconds: f64,
        phases: Vec<Phase>,
    ) -> Result<Self> {
        let protocol = Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            total_duration_seconds,
            phases,
        };
        protocol.validate()?;
        Ok(protocol)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parse a protocol from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let protocol: Protocol = serde_json::from_str(json)?;
        protocol.validate()?;
        Ok(protocol)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.total_duration_seconds
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Sum of all phase duration fractions
    pub fn duration_sum(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Check every protocol invariant
    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(EntrainError::ProtocolInvalid {
                reason: format!("protocol '{}' has no phases", self.id),
            });
        }
        if !(self.total_duration_seconds.is_finite() && self.total_duration_seconds > 0.0) {
            return Err(EntrainError::ProtocolInvalid {
                reason: format!(
                    "protocol '{}' has total duration {}s",
                    self.id, self.total_duration_seconds
                ),
            });
        }
        for (index, phase) in self.phases.iter().enumerate() {
            phase.validate(index)?;
        }
        let sum = self.duration_sum();
        if (sum - 1.0).abs() > DURATION_EPSILON {
            return Err(EntrainError::ProtocolInvalid {
                reason: format!(
                    "phase durations of '{}' sum to {:.9} (expected 1.0)",
                    self.id, sum
                ),
            });
        }
        Ok(())
    }
}
