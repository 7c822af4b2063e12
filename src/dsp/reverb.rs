//! Reverb send
//!
//! Freeverb-style room on a send bus: the compressed mix is summed to mono,
//! fed through 8 parallel damped comb filters and 4 series allpass filters
//! per channel, and the wet result is added back on top of the dry signal.
//! The room is fixed for the lifetime of a graph; only the send level moves.

use super::param::AudioParam;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Right channel delay offset in samples
const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;

const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;

/// Input attenuation ahead of the comb bank
const INPUT_GAIN: f32 = 0.015;

/// Fixed room for the ambient bed
const ROOM_SIZE: f32 = 0.6;
const DAMPING: f32 = 0.5;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
            feedback: ROOM_SIZE * ROOM_SCALE + ROOM_OFFSET,
            damp1: DAMPING * DAMP_SCALE,
            damp2: 1.0 - DAMPING * DAMP_SCALE,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * self.damp2 + self.filter_state * self.damp1;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.pos = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

/// Schroeder allpass for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.pos] = input + ALLPASS_GAIN * output;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.pos = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

// ============================================================================
// Reverb Send
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReverbSend {
    comb_left: [CombFilter; 8],
    comb_right: [CombFilter; 8],
    allpass_left: [AllpassFilter; 4],
    allpass_right: [AllpassFilter; 4],
    enabled: bool,
    wet: AudioParam,
}

impl ReverbSend {
    pub fn new(sample_rate: f64, wet: f32, enabled: bool) -> Self {
        let scale = sample_rate / REFERENCE_SAMPLE_RATE;
        let scaled = |samples: usize| ((samples as f64 * scale) as usize).max(1);
        Self {
            comb_left: std::array::from_fn(|i| CombFilter::new(scaled(COMB_DELAYS[i]))),
            comb_right: std::array::from_fn(|i| {
                CombFilter::new(scaled(COMB_DELAYS[i] + STEREO_SPREAD))
            }),
            allpass_left: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_DELAYS[i]))),
            allpass_right: std::array::from_fn(|i| {
                AllpassFilter::new(scaled(ALLPASS_DELAYS[i] + STEREO_SPREAD))
            }),
            enabled,
            wet: AudioParam::new("reverb_wet", wet, 0.0, 1.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Process one frame, returning dry plus wet
    #[inline]
    pub fn process_frame(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        if !self.enabled {
            return (left, right);
        }
        let input = (left + right) * 0.5 * INPUT_GAIN;

        let mut out_left = 0.0;
        let mut out_right = 0.0;
        for comb in &mut self.comb_left {
            out_left += comb.process(input);
        }
        for comb in &mut self.comb_right {
            out_right += comb.process(input);
        }
        for allpass in &mut self.allpass_left {
            out_left = allpass.process(out_left);
        }
        for allpass in &mut self.allpass_right {
            out_right = allpass.process(out_right);
        }

        let wet = self.wet.value_at(time);
        (left + out_left * wet, right + out_right * wet)
    }

    pub fn reset(&mut self) {
        self.comb_left.iter_mut().for_each(CombFilter::clear);
        self.comb_right.iter_mut().for_each(CombFilter::clear);
        self.allpass_left.iter_mut().for_each(AllpassFilter::clear);
        self.allpass_right.iter_mut().for_each(AllpassFilter::clear);
    }

    pub(crate) fn param(&self) -> &AudioParam {
        &self.wet
    }

    pub(crate) fn param_mut(&mut self) -> &mut AudioParam {
        &mut self.wet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comb_filter_echo() {
        let mut comb = CombFilter::new(10);
        assert_eq!(comb.process(1.0), 0.0);
        for _ in 0..9 {
            comb.process(0.0);
        }
        assert!(comb.process(0.0).abs() > 0.0);
    }

    #[test]
    fn test_allpass_impulse() {
        let mut allpass = AllpassFilter::new(10);
        assert!((allpass.process(1.0) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_is_dry() {
        let mut reverb = ReverbSend::new(48000.0, 0.15, false);
        assert_eq!(reverb.process_frame(0.0, 0.3, -0.2), (0.3, -0.2));
    }

    #[test]
    fn test_tail_follows_impulse() {
        let sr = 44100.0;
        let mut reverb = ReverbSend::new(sr, 1.0, true);
        let (l, _) = reverb.process_frame(0.0, 1.0, 1.0);
        assert!((l - 1.0).abs() < 1e-6);
        let mut tail = 0.0_f32;
        for _ in 0..3000 {
            let (l, r) = reverb.process_frame(0.0, 0.0, 0.0);
            assert!(l.is_finite() && r.is_finite());
            tail = tail.max(l.abs()).max(r.abs());
        }
        assert!(tail > 0.0, "no reverb tail");

        reverb.reset();
        for _ in 0..1000 {
            assert_eq!(reverb.process_frame(0.0, 0.0, 0.0), (0.0, 0.0));
        }
    }

    #[test]
    fn test_stays_bounded_on_steady_input() {
        let mut reverb = ReverbSend::new(48000.0, 0.15, true);
        let mut peak = 0.0_f32;
        for i in 0..48000 {
            let x = (i as f32 * 0.05).sin() * 0.5;
            let (l, r) = reverb.process_frame(0.0, x, x);
            peak = peak.max(l.abs()).max(r.abs());
        }
        assert!(peak < 1.0, "peak {}", peak);
    }
}
