//! Spatial panner
//!
//! Places the binaural pair in the stereo field. The left generator sits at
//! `position - SPREAD` and the right generator at `position + SPREAD`, so the
//! pair keeps its separation while the whole image moves.

use std::f32::consts::FRAC_PI_2;

use super::param::AudioParam;

/// Fixed offset between the two binaural generators
pub const SPREAD: f32 = 0.3;

/// Equal-power gains (left, right) for a pan value in [-1, 1]
#[inline]
pub fn equal_power(pan: f32) -> (f32, f32) {
    let x = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5;
    ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin())
}

#[derive(Debug, Clone)]
pub struct SpatialPanner {
    position: AudioParam,
}

impl SpatialPanner {
    pub fn new() -> Self {
        Self {
            position: AudioParam::new("spatial_position", 0.0, -1.0, 1.0),
        }
    }

    /// Target position
    pub fn position(&self) -> f32 {
        self.position.target()
    }

    pub fn set_position(&mut self, position: f32, now: f64, ramp_seconds: f64) {
        self.position.linear_ramp_to(position, now, ramp_seconds);
    }

    /// Place the generator pair, returning the (left, right) output
    #[inline]
    pub fn process(&self, time: f64, left_gen: f32, right_gen: f32) -> (f32, f32) {
        let position = self.position.value_at(time);
        let (ll, lr) = equal_power(position - SPREAD);
        let (rl, rr) = equal_power(position + SPREAD);
        (left_gen * ll + right_gen * rl, left_gen * lr + right_gen * rr)
    }

    pub(crate) fn param(&self) -> &AudioParam {
        &self.position
    }

    pub(crate) fn param_mut(&mut self) -> &mut AudioParam {
        &mut self.position
    }
}

impl Default for SpatialPanner {
    fn default() -> Self {
        Self::new()
    }
}
