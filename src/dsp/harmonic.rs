//! Harmonic oscillator bank
//!
//! Layer `i` (1 = fundamental) runs a left generator at `carrier * i` and a
//! right generator at `carrier * i + beat`, so every harmonic carries the same
//! binaural difference frequency. Layer gains follow `1 / (i * 1.5)` scaled by
//! the active timbre preset.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::oscillator::SineOscillator;
use super::param::AudioParam;

/// Timbre presets biasing gain toward the fundamental or the harmonics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimbrePreset {
    Warm,
    Bright,
    Deep,
    Ethereal,
    #[default]
    Natural,
}

impl TimbrePreset {
    pub const ALL: [TimbrePreset; 5] = [
        TimbrePreset::Warm,
        TimbrePreset::Bright,
        TimbrePreset::Deep,
        TimbrePreset::Ethereal,
        TimbrePreset::Natural,
    ];

    /// Gain multiplier for harmonic layer `index` (1-based)
    ///
    /// | preset   | layer 1 | layer 2 | layer 3+ |
    /// |----------|---------|---------|----------|
    /// | warm     | 1.2     | 0.6     | 0.6      |
    /// | bright   | 0.8     | 1.3     | 1.3      |
    /// | deep     | 1.4     | 0.5     | 0.3      |
    /// | ethereal | 0.7     | 1.0     | 1.2      |
    /// | natural  | 1.0     | 1.0     | 1.0      |
    pub fn multiplier(&self, index: usize) -> f32 {
        match (self, index) {
            (TimbrePreset::Warm, 1) => 1.2,
            (TimbrePreset::Warm, _) => 0.6,
            (TimbrePreset::Bright, 1) => 0.8,
            (TimbrePreset::Bright, _) => 1.3,
            (TimbrePreset::Deep, 1) => 1.4,
            (TimbrePreset::Deep, 2) => 0.5,
            (TimbrePreset::Deep, _) => 0.3,
            (TimbrePreset::Ethereal, 1) => 0.7,
            (TimbrePreset::Ethereal, 2) => 1.0,
            (TimbrePreset::Ethereal, _) => 1.2,
            (TimbrePreset::Natural, _) => 1.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "warm" => Some(TimbrePreset::Warm),
            "bright" => Some(TimbrePreset::Bright),
            "deep" => Some(TimbrePreset::Deep),
            "ethereal" => Some(TimbrePreset::Ethereal),
            "natural" => Some(TimbrePreset::Natural),
            _ => None,
        }
    }
}

impl fmt::Display for TimbrePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimbrePreset::Warm => "warm",
            TimbrePreset::Bright => "bright",
            TimbrePreset::Deep => "deep",
            TimbrePreset::Ethereal => "ethereal",
            TimbrePreset::Natural => "natural",
        };
        write!(f, "{}", name)
    }
}

/// Target gain of harmonic layer `index` under `preset`
pub fn layer_gain(index: usize, preset: TimbrePreset) -> f32 {
    1.0 / (index as f32 * 1.5) * preset.multiplier(index)
}

/// Read-only view of one harmonic layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalLayer {
    /// 1 = fundamental, 2..N = harmonics
    pub index: usize,
    /// Target gain of the layer
    pub gain: f32,
}

#[derive(Debug, Clone)]
struct HarmonicLayer {
    index: usize,
    left: SineOscillator,
    right: SineOscillator,
    gain: AudioParam,
}

/// Bank of binaural oscillator pairs
#[derive(Debug, Clone)]
pub struct HarmonicBank {
    layers: Vec<HarmonicLayer>,
    preset: TimbrePreset,
}

impl HarmonicBank {
    pub fn new(num_layers: usize, sample_rate: f64) -> Self {
        let preset = TimbrePreset::default();
        let layers = (1..=num_layers)
            .map(|index| HarmonicLayer {
                index,
                left: SineOscillator::new(sample_rate),
                right: SineOscillator::new(sample_rate),
                gain: AudioParam::new("layer_gain", layer_gain(index, preset), 0.0, 2.0),
            })
            .collect();
        Self { layers, preset }
    }

    pub fn preset(&self) -> TimbrePreset {
        self.preset
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Switch preset, ramping every layer gain to its new target
    pub fn set_preset(&mut self, preset: TimbrePreset, now: f64, ramp_seconds: f64) {
        self.preset = preset;
        for layer in &mut self.layers {
            layer
                .gain
                .linear_ramp_to(layer_gain(layer.index, preset), now, ramp_seconds);
        }
    }

    /// Current layer targets
    pub fn layers(&self) -> Vec<SignalLayer> {
        self.layers
            .iter()
            .map(|layer| SignalLayer {
                index: layer.index,
                gain: layer.gain.target(),
            })
            .collect()
    }

    /// Next (left generator, right generator) sums
    #[inline]
    pub fn next_frame(&mut self, time: f64, carrier_hz: f64, beat_hz: f64) -> (f32, f32) {
        let mut left = 0.0_f64;
        let mut right = 0.0_f64;
        for layer in &mut self.layers {
            let gain = layer.gain.value_at(time) as f64;
            let base = carrier_hz * layer.index as f64;
            left += gain * layer.left.next_sample(base);
            right += gain * layer.right.next_sample(base + beat_hz);
        }
        (left as f32, right as f32)
    }

    pub(crate) fn params_mut(&mut self) -> impl Iterator<Item = &mut AudioParam> {
        self.layers.iter_mut().map(|layer| &mut layer.gain)
    }

    pub(crate) fn params(&self) -> impl Iterator<Item = &AudioParam> {
        self.layers.iter().map(|layer| &layer.gain)
    }
}
