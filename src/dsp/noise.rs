//! Ambient noise generators
//!
//! Three stochastic sources, each rendered once into a loop buffer and played
//! back with wrap-around:
//! - white: uniform random samples
//! - pink: Paul Kellet's filtered recurrence (approximately 1/f)
//! - brown: leaky random-walk integrator
//!
//! Every layer runs through its own one-pole low-pass and a gain with fade
//! envelopes. When a fade-out completes the loop buffer is released and the
//! layer produces nothing further.

use std::f64::consts::TAU;
use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::param::AudioParam;

/// Noise colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseType {
    White,
    Pink,
    Brown,
}

impl NoiseType {
    pub const ALL: [NoiseType; 3] = [NoiseType::White, NoiseType::Pink, NoiseType::Brown];

    /// Default low-pass cutoff in Hz
    pub fn default_cutoff_hz(&self) -> f32 {
        match self {
            NoiseType::White => 8000.0,
            NoiseType::Pink => 4000.0,
            NoiseType::Brown => 1000.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "white" => Some(NoiseType::White),
            "pink" => Some(NoiseType::Pink),
            "brown" => Some(NoiseType::Brown),
            _ => None,
        }
    }

    fn seed_offset(&self) -> u64 {
        match self {
            NoiseType::White => 0x5157,
            NoiseType::Pink => 0x9e37,
            NoiseType::Brown => 0xb0b5,
        }
    }
}

impl fmt::Display for NoiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NoiseType::White => "white",
            NoiseType::Pink => "pink",
            NoiseType::Brown => "brown",
        };
        write!(f, "{}", name)
    }
}

/// Render `len` samples of noise
pub fn generate_noise(noise_type: NoiseType, len: usize, rng: &mut SmallRng) -> Vec<f32> {
    let mut out = Vec::with_capacity(len);
    match noise_type {
        NoiseType::White => {
            for _ in 0..len {
                out.push(rng.gen_range(-1.0_f32..1.0));
            }
        }
        NoiseType::Pink => {
            let mut b = [0.0_f32; 7];
            for _ in 0..len {
                let white = rng.gen_range(-1.0_f32..1.0);
                b[0] = 0.99886 * b[0] + white * 0.0555179;
                b[1] = 0.99332 * b[1] + white * 0.0750759;
                b[2] = 0.96900 * b[2] + white * 0.1538520;
                b[3] = 0.86650 * b[3] + white * 0.3104856;
                b[4] = 0.55000 * b[4] + white * 0.5329522;
                b[5] = -0.7616 * b[5] - white * 0.0168980;
                let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
                b[6] = white * 0.115926;
                out.push(pink * 0.11);
            }
        }
        NoiseType::Brown => {
            let mut last = 0.0_f32;
            for _ in 0..len {
                let white = rng.gen_range(-1.0_f32..1.0);
                last = (last + 0.02 * white) / 1.02;
                out.push(last * 3.5);
            }
        }
    }
    out
}

/// Snapshot of a noise layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseLayerState {
    pub noise_type: NoiseType,
    pub target_volume: f32,
    pub cutoff_hz: f32,
    pub running: bool,
}

/// One noise source with filter, gain and fade envelope
#[derive(Debug, Clone)]
pub struct NoiseLayer {
    noise_type: NoiseType,
    sample_rate: f64,
    loop_len: usize,
    rng: SmallRng,
    /// Loop buffer, present only while the layer is running
    source: Option<Vec<f32>>,
    position: usize,
    cutoff_hz: f32,
    filter_coeff: f32,
    filter_state: f32,
    gain: AudioParam,
    target_volume: f32,
    /// Audio time at which a fade-out completes and the source is released
    release_at: Option<f64>,
}

impl NoiseLayer {
    pub fn new(noise_type: NoiseType, sample_rate: f64, loop_seconds: f64, seed: u64) -> Self {
        let cutoff_hz = noise_type.default_cutoff_hz();
        Self {
            noise_type,
            sample_rate,
            loop_len: ((loop_seconds * sample_rate) as usize).max(1),
            rng: SmallRng::seed_from_u64(seed ^ noise_type.seed_offset()),
            source: None,
            position: 0,
            cutoff_hz,
            filter_coeff: lowpass_coeff(cutoff_hz, sample_rate),
            filter_state: 0.0,
            gain: AudioParam::new("noise_gain", 0.0, 0.0, 1.0),
            target_volume: 0.0,
            release_at: None,
        }
    }

    pub fn noise_type(&self) -> NoiseType {
        self.noise_type
    }

    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }

    /// Change the low-pass cutoff
    pub fn set_cutoff_hz(&mut self, cutoff_hz: f32) {
        let nyquist = (self.sample_rate / 2.0) as f32;
        self.cutoff_hz = cutoff_hz.clamp(20.0, nyquist);
        self.filter_coeff = lowpass_coeff(self.cutoff_hz, self.sample_rate);
    }

    pub fn state(&self) -> NoiseLayerState {
        NoiseLayerState {
            noise_type: self.noise_type,
            target_volume: self.target_volume,
            cutoff_hz: self.cutoff_hz,
            running: self.is_running(),
        }
    }

    /// Start (or re-target) the layer, fading to `volume`
    pub fn start(&mut self, volume: f32, now: f64, fade_seconds: f64) {
        if self.source.is_none() {
            let len = self.loop_len;
            self.source = Some(generate_noise(self.noise_type, len, &mut self.rng));
            self.position = 0;
            self.filter_state = 0.0;
            self.gain.set_value(0.0);
            debug!(noise = %self.noise_type, len, "noise source created");
        }
        self.release_at = None;
        self.target_volume = volume.clamp(0.0, 1.0);
        self.gain
            .linear_ramp_to(self.target_volume, now, fade_seconds);
    }

    /// Fade out and release the source once the fade completes
    ///
    /// Returns false if the layer was not running.
    pub fn stop(&mut self, now: f64, fade_seconds: f64) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.target_volume = 0.0;
        self.gain.linear_ramp_to(0.0, now, fade_seconds);
        self.release_at = Some(now + fade_seconds.max(0.0));
        true
    }

    /// Next filtered, gained sample
    #[inline]
    pub fn next_sample(&mut self, time: f64) -> f32 {
        if let Some(release_at) = self.release_at {
            if time >= release_at {
                self.release();
                return 0.0;
            }
        }
        let Some(source) = self.source.as_ref() else {
            return 0.0;
        };
        let raw = source[self.position];
        self.position += 1;
        if self.position >= source.len() {
            self.position = 0;
        }
        self.filter_state += self.filter_coeff * (raw - self.filter_state);
        self.filter_state * self.gain.value_at(time)
    }

    fn release(&mut self) {
        self.source = None;
        self.release_at = None;
        self.position = 0;
        self.filter_state = 0.0;
        self.gain.set_value(0.0);
        debug!(noise = %self.noise_type, "noise source released");
    }

    pub(crate) fn param(&self) -> &AudioParam {
        &self.gain
    }

    pub(crate) fn param_mut(&mut self) -> &mut AudioParam {
        &mut self.gain
    }
}

/// One-pole low-pass coefficient for `cutoff_hz`
fn lowpass_coeff(cutoff_hz: f32, sample_rate: f64) -> f32 {
    (1.0 - (-TAU * cutoff_hz as f64 / sample_rate).exp()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn mean_abs_diff(samples: &[f32]) -> f32 {
        samples.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>() / samples.len() as f32
    }

    #[test]
    fn test_white_noise_range() {
        let samples = generate_noise(NoiseType::White, 10_000, &mut rng());
        assert!(samples.iter().all(|s| (-1.0..1.0).contains(s)));
        let mean: f32 = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn test_colours_get_smoother() {
        let white = generate_noise(NoiseType::White, 20_000, &mut rng());
        let pink = generate_noise(NoiseType::Pink, 20_000, &mut rng());
        let brown = generate_noise(NoiseType::Brown, 20_000, &mut rng());
        assert!(mean_abs_diff(&pink) < mean_abs_diff(&white));
        assert!(mean_abs_diff(&brown) < mean_abs_diff(&pink));
    }

    #[test]
    fn test_fade_out_releases_source() {
        let sr = 1000.0;
        let mut layer = NoiseLayer::new(NoiseType::Pink, sr, 1.0, 1);
        layer.start(0.5, 0.0, 0.0);
        assert!(layer.is_running());
        assert!(layer.stop(1.0, 2.0));
        assert_eq!(layer.param().target(), 0.0);
        let mut t = 1.0;
        while t < 3.0 {
            layer.next_sample(t);
            t += 1.0 / sr;
        }
        assert_eq!(layer.next_sample(3.0), 0.0);
        assert!(!layer.is_running());
        for i in 0..100 {
            assert_eq!(layer.next_sample(3.0 + i as f64 / sr), 0.0);
        }
    }

    #[test]
    fn test_loop_wraps() {
        let mut layer = NoiseLayer::new(NoiseType::White, 100.0, 0.5, 3);
        layer.set_cutoff_hz(50.0);
        layer.start(1.0, 0.0, 0.0);
        let first: Vec<f32> = (0..50).map(|_| layer.next_sample(0.0)).collect();
        let second: Vec<f32> = (0..50).map(|_| layer.next_sample(0.0)).collect();
        assert!(first.iter().any(|s| *s != 0.0));
        assert!(second.iter().any(|s| *s != 0.0));
        assert!(layer.is_running());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut layer = NoiseLayer::new(NoiseType::Brown, 48000.0, 1.0, 9);
        assert!(!layer.stop(0.0, 1.0));
        assert_eq!(layer.next_sample(0.0), 0.0);
    }
}
