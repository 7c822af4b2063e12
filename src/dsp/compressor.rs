//! Bus compressor
//!
//! Fixed-parameter, stereo-linked feed-forward compressor applied to the
//! summed signal before the master gain. Peak detection, soft knee and
//! one-pole attack/release smoothing of the gain reduction.

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::error::{EntrainError, Result};

/// Floor used when converting silence to dB
const SILENCE_DB: f32 = -96.0;

/// Compressor settings, fixed for the lifetime of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    /// Threshold level in dB (-60 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0)
    pub ratio: f32,
    /// Attack time in milliseconds (0.1 to 100 ms)
    pub attack_ms: f32,
    /// Release time in milliseconds (10 to 1000 ms)
    pub release_ms: f32,
    /// Knee width in dB (0 = hard knee, up to 12 dB)
    pub knee_db: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 4.0,
            attack_ms: 3.0,
            release_ms: 250.0,
            knee_db: 6.0,
        }
    }
}

impl CompressorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(-60.0..=0.0).contains(&self.threshold_db) {
            return Err(EntrainError::invalid_parameter(
                "compressor.threshold_db",
                self.threshold_db,
                "-60 to 0 dB",
            ));
        }
        if !(1.0..=20.0).contains(&self.ratio) {
            return Err(EntrainError::invalid_parameter(
                "compressor.ratio",
                self.ratio,
                "1.0 to 20.0",
            ));
        }
        if !(0.1..=100.0).contains(&self.attack_ms) {
            return Err(EntrainError::invalid_parameter(
                "compressor.attack_ms",
                self.attack_ms,
                "0.1 to 100 ms",
            ));
        }
        if !(10.0..=1000.0).contains(&self.release_ms) {
            return Err(EntrainError::invalid_parameter(
                "compressor.release_ms",
                self.release_ms,
                "10 to 1000 ms",
            ));
        }
        if !(0.0..=12.0).contains(&self.knee_db) {
            return Err(EntrainError::invalid_parameter(
                "compressor.knee_db",
                self.knee_db,
                "0 to 12 dB",
            ));
        }
        Ok(())
    }
}

/// Stereo-linked compressor
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction (linear, 1.0 = none)
    gain_reduction: f32,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: f64) -> Self {
        let attack_coeff = time_to_coeff(settings.attack_ms, sample_rate);
        let release_coeff = time_to_coeff(settings.release_ms, sample_rate);
        Self {
            settings,
            attack_coeff,
            release_coeff,
            gain_reduction: 1.0,
        }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// Current gain reduction in dB for metering
    pub fn gain_reduction_db(&self) -> f32 {
        if self.gain_reduction > 0.0 {
            linear_to_db(self.gain_reduction)
        } else {
            SILENCE_DB
        }
    }

    /// Static gain reduction in dB (non-positive) for an input level
    fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.settings.threshold_db;
        let ratio = self.settings.ratio;
        let knee = self.settings.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;
            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic blend from 1:1 at knee_start to full ratio at knee_end
                let knee_factor = (input_db - knee_start) / knee;
                let effective_ratio = 1.0 + (ratio - 1.0) * knee_factor * knee_factor;
                (knee_start + (input_db - knee_start) / effective_ratio) - input_db
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }

    /// Process one stereo frame
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = left.abs().max(right.abs());
        let input_db = if level > 0.0 {
            linear_to_db(level)
        } else {
            SILENCE_DB
        };
        let target = db_to_linear(self.compute_gain_reduction_db(input_db));
        let coeff = if target < self.gain_reduction {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain_reduction = coeff * self.gain_reduction + (1.0 - coeff) * target;
        (left * self.gain_reduction, right * self.gain_reduction)
    }

    pub fn reset(&mut self) {
        self.gain_reduction = 1.0;
    }
}

/// One-pole smoothing coefficient for a time constant
#[inline]
fn time_to_coeff(time_ms: f32, sample_rate: f64) -> f32 {
    let samples = (time_ms / 1000.0) * sample_rate as f32;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}
