//! Frequency trajectory calculator
//!
//! Pure functions mapping a phase frequency spec and phase progress to an
//! instantaneous beat frequency, and a beat frequency to a carrier band.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::FrequencySpec;

/// Progress at which a three-point sweep switches segments
pub const THREE_POINT_SPLIT: f64 = 0.5;

/// Brainwave band used to pick a carrier frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierBand {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl CarrierBand {
    /// Band containing a beat frequency
    pub fn for_beat(beat_hz: f64) -> Self {
        if beat_hz < 4.0 {
            CarrierBand::Delta
        } else if beat_hz < 8.0 {
            CarrierBand::Theta
        } else if beat_hz < 14.0 {
            CarrierBand::Alpha
        } else if beat_hz < 30.0 {
            CarrierBand::Beta
        } else {
            CarrierBand::Gamma
        }
    }

    /// Base carrier frequency for this band in Hz
    pub fn carrier_hz(&self) -> f64 {
        match self {
            CarrierBand::Delta => 100.0,
            CarrierBand::Theta => 150.0,
            CarrierBand::Alpha => 200.0,
            CarrierBand::Beta => 250.0,
            CarrierBand::Gamma => 300.0,
        }
    }

    /// Parse a band name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "delta" => Some(CarrierBand::Delta),
            "theta" => Some(CarrierBand::Theta),
            "alpha" => Some(CarrierBand::Alpha),
            "beta" => Some(CarrierBand::Beta),
            "gamma" => Some(CarrierBand::Gamma),
            _ => None,
        }
    }
}

impl fmt::Display for CarrierBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CarrierBand::Delta => "delta",
            CarrierBand::Theta => "theta",
            CarrierBand::Alpha => "alpha",
            CarrierBand::Beta => "beta",
            CarrierBand::Gamma => "gamma",
        };
        write!(f, "{}", name)
    }
}

/// Beat frequency, band and carrier at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub beat_hz: f64,
    pub band: CarrierBand,
    pub carrier_hz: f64,
}

/// Linear interpolation that is exact at both endpoints
#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

/// Instantaneous beat frequency for `spec` at `progress` (clamped to 0..=1)
pub fn beat_frequency(spec: &FrequencySpec, progress: f64) -> f64 {
    let p = if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    };
    match *spec {
        FrequencySpec::Constant { hz } => hz,
        FrequencySpec::Sweep { start, end } => lerp(start, end, p),
        FrequencySpec::ThreePoint { start, mid, end } => {
            if p <= THREE_POINT_SPLIT {
                lerp(start, mid, p / THREE_POINT_SPLIT)
            } else {
                lerp(mid, end, (p - THREE_POINT_SPLIT) / (1.0 - THREE_POINT_SPLIT))
            }
        }
    }
}

/// Beat frequency plus the carrier selected for it
pub fn evaluate(spec: &FrequencySpec, progress: f64) -> TrajectoryPoint {
    let beat_hz = beat_frequency(spec, progress);
    let band = CarrierBand::for_beat(beat_hz);
    TrajectoryPoint {
        beat_hz,
        band,
        carrier_hz: band.carrier_hz(),
    }
}
