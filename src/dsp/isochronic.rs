//! Isochronic amplitude modulator
//!
//! A low-frequency pulse applied to the binaural bus. The pulse rate follows
//! the current beat frequency and `depth` sets how far the amplitude dips.
//! With depth 0 the modulator is transparent, so it combines freely with the
//! binaural layers.

use std::f64::consts::TAU;

use super::param::AudioParam;

#[derive(Debug, Clone)]
pub struct IsochronicModulator {
    /// LFO phase in cycles
    phase: f64,
    sample_rate: f64,
    depth: AudioParam,
    enabled: bool,
    intensity: f32,
}

impl IsochronicModulator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
            depth: AudioParam::new("isochronic_depth", 0.0, 0.0, 1.0),
            enabled: false,
            intensity: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Requested intensity (kept while disabled)
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Toggle the pulse, ramping the modulation depth
    pub fn set(&mut self, enabled: bool, intensity: f32, now: f64, ramp_seconds: f64) {
        self.enabled = enabled;
        self.intensity = intensity.clamp(0.0, 1.0);
        let target = if enabled { self.intensity } else { 0.0 };
        self.depth.linear_ramp_to(target, now, ramp_seconds);
    }

    /// Gain multiplier for the next frame
    ///
    /// The LFO advances even while the depth is zero so re-enabling does not
    /// restart the pulse mid-cycle.
    #[inline]
    pub fn next_gain(&mut self, time: f64, beat_hz: f64) -> f32 {
        let lfo = 0.5 + 0.5 * (TAU * self.phase).sin();
        self.phase += beat_hz / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        let depth = self.depth.value_at(time);
        (1.0 - depth) + depth * lfo as f32
    }

    pub(crate) fn param(&self) -> &AudioParam {
        &self.depth
    }

    pub(crate) fn param_mut(&mut self) -> &mut AudioParam {
        &mut self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_transparent() {
        let mut iso = IsochronicModulator::new(48000.0);
        for _ in 0..1000 {
            assert_eq!(iso.next_gain(0.0, 10.0), 1.0);
        }
    }

    #[test]
    fn test_full_depth_spans_zero_to_one() {
        let sr = 1000.0;
        let mut iso = IsochronicModulator::new(sr);
        iso.set(true, 1.0, 0.0, 0.0);
        let gains: Vec<f32> = (0..100).map(|_| iso.next_gain(0.0, 10.0)).collect();
        let max = gains.iter().cloned().fold(f32::MIN, f32::max);
        let min = gains.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max > 0.99);
        assert!(min < 0.01);
    }

    #[test]
    fn test_partial_depth_floor() {
        let mut iso = IsochronicModulator::new(1000.0);
        iso.set(true, 0.4, 0.0, 0.0);
        let min = (0..200)
            .map(|_| iso.next_gain(0.0, 5.0))
            .fold(f32::MAX, f32::min);
        assert!((min - 0.6).abs() < 0.01);
        assert!(iso.is_enabled());
    }

    #[test]
    fn test_disable_ramps_depth_down() {
        let mut iso = IsochronicModulator::new(1000.0);
        iso.set(true, 0.8, 0.0, 0.0);
        iso.set(false, 0.8, 1.0, 0.5);
        assert_eq!(iso.param().target(), 0.0);
        assert_eq!(iso.param().scheduled_end(), Some(1.5));
        assert_eq!(iso.intensity(), 0.8);
    }
}
