//! Sine oscillator with a continuous phase accumulator

use std::f64::consts::TAU;

/// Phase-continuous sine oscillator
///
/// The frequency is supplied per sample so ramped frequency parameters glide
/// without phase jumps.
#[derive(Debug, Clone)]
pub struct SineOscillator {
    /// Phase in cycles [0, 1)
    phase: f64,
    sample_rate: f64,
}

impl SineOscillator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at `frequency` Hz
    #[inline]
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let sample = (TAU * self.phase).sin();
        self.phase += frequency / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        sample
    }

    /// Current phase in cycles
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}
