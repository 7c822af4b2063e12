//! Signal synthesis graph
//!
//! Owns every node of the synthesis path and renders stereo blocks on the
//! audio clock. The audio clock is the number of frames rendered so far
//! divided by the sample rate; all parameter ramps are scheduled against it.
//!
//! Per frame:
//!
//! ```text
//! harmonic bank -> panner -> isochronic gain ─┐
//! noise (white/pink/brown) -> low-pass -> gain ┴-> mixer -> compressor
//!     -> reverb send -> master gain -> safety limiter -> destination
//!                                                     └-> analysis tap
//! ```
//!
//! The destination is gated: until [`SignalGraph::activate_output`] is called
//! (or while the graph is halted) rendered blocks are silent, but every node
//! keeps advancing and the analysis tap keeps filling.

use rand::Rng;
use tracing::{debug, info};

use super::analyser::AnalysisTap;
use super::compressor::Compressor;
use super::harmonic::{HarmonicBank, SignalLayer, TimbrePreset};
use super::isochronic::IsochronicModulator;
use super::noise::{NoiseLayer, NoiseLayerState, NoiseType};
use super::panner::SpatialPanner;
use super::param::AudioParam;
use super::reverb::ReverbSend;
use super::topology::GraphTopology;
use crate::config::EngineConfig;
use crate::engine::buffer::{AudioBuffer, LEFT, RIGHT};
use crate::error::Result;
use crate::trajectory::CarrierBand;

/// Bounds of the carrier parameter
const CARRIER_RANGE: (f32, f32) = (20.0, 2000.0);

/// Beat frequency before any session pushes one
const INITIAL_BEAT_HZ: f64 = 10.0;

#[derive(Debug)]
pub struct SignalGraph {
    sample_rate: f64,
    frames_rendered: u64,
    topology: GraphTopology,

    harmonics: HarmonicBank,
    isochronic: IsochronicModulator,
    panner: SpatialPanner,
    noise: Vec<NoiseLayer>,
    compressor: Compressor,
    reverb: ReverbSend,
    tap: AnalysisTap,

    beat: AudioParam,
    carrier: AudioParam,
    master: AudioParam,
    /// Requested beat frequency, kept at full precision
    beat_hz: f64,
    carrier_hz: f64,
    volume_ceiling: f32,

    output_active: bool,
    halted: bool,

    tap_left: Vec<f32>,
    tap_right: Vec<f32>,
}

impl SignalGraph {
    /// Build and validate the graph for a configuration
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let sample_rate = config.sample_rate_f64();
        let topology = GraphTopology::standard(config.harmonic_layers, NoiseType::ALL.len())?;
        let seed = config
            .noise_seed
            .unwrap_or_else(|| rand::thread_rng().gen());

        let initial_carrier = CarrierBand::for_beat(INITIAL_BEAT_HZ).carrier_hz();
        let noise = NoiseType::ALL
            .iter()
            .map(|t| NoiseLayer::new(*t, sample_rate, config.noise_loop_seconds, seed))
            .collect();

        debug!(
            nodes = topology.nodes().len(),
            connections = topology.connections().len(),
            sample_rate,
            "signal graph built"
        );

        Ok(Self {
            sample_rate,
            frames_rendered: 0,
            topology,
            harmonics: HarmonicBank::new(config.harmonic_layers, sample_rate),
            isochronic: IsochronicModulator::new(sample_rate),
            panner: SpatialPanner::new(),
            noise,
            compressor: Compressor::new(config.compressor.clone(), sample_rate),
            reverb: ReverbSend::new(sample_rate, config.reverb_wet, config.reverb_enabled),
            tap: AnalysisTap::new(config.analysis_fft_size),
            beat: AudioParam::new("beat_frequency", INITIAL_BEAT_HZ as f32, 0.5, 40.0),
            carrier: AudioParam::new(
                "carrier_frequency",
                initial_carrier as f32,
                CARRIER_RANGE.0,
                CARRIER_RANGE.1,
            ),
            master: AudioParam::new(
                "master_gain",
                config.master_volume.min(config.volume_ceiling),
                0.0,
                config.volume_ceiling,
            ),
            beat_hz: INITIAL_BEAT_HZ,
            carrier_hz: initial_carrier,
            volume_ceiling: config.volume_ceiling,
            output_active: false,
            halted: false,
            tap_left: Vec::with_capacity(config.block_size),
            tap_right: Vec::with_capacity(config.block_size),
        })
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Current audio time in seconds
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn topology(&self) -> &GraphTopology {
        &self.topology
    }

    /// Handle for visualization consumers
    pub fn analysis_tap(&self) -> AnalysisTap {
        self.tap.clone()
    }

    // ========================================================================
    // Output gate
    // ========================================================================

    /// Open the destination gate
    pub fn activate_output(&mut self) {
        if !self.output_active {
            info!("audio output activated");
        }
        self.output_active = true;
    }

    pub fn is_output_active(&self) -> bool {
        self.output_active
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Clear a previous halt so a new session can sound
    pub fn clear_halt(&mut self) {
        self.halted = false;
    }

    /// Cancel every in-flight ramp and force the master gain to zero now
    ///
    /// Returns the number of ramps that were still running.
    pub fn halt(&mut self) -> usize {
        let now = self.now();
        let cancelled = self
            .params_mut()
            .into_iter()
            .map(|p| p.cancel_and_hold(now))
            .filter(|in_flight| *in_flight)
            .count();
        self.master.set_value(0.0);
        self.halted = true;
        cancelled
    }

    /// Latest end time of any scheduled ramp
    pub fn latest_scheduled_end(&self) -> Option<f64> {
        self.params()
            .into_iter()
            .filter_map(AudioParam::scheduled_end)
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))))
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Ramp to a new beat frequency and carrier
    ///
    /// The caller is responsible for range validation; `beat_hz` is stored
    /// exactly as given.
    pub fn set_beat_frequency(&mut self, beat_hz: f64, carrier_hz: f64, ramp_seconds: f64) {
        let now = self.now();
        self.beat_hz = beat_hz;
        self.beat.linear_ramp_to(beat_hz as f32, now, ramp_seconds);
        if carrier_hz != self.carrier_hz {
            self.carrier_hz = carrier_hz;
            self.carrier
                .linear_ramp_to(carrier_hz as f32, now, ramp_seconds);
        }
    }

    /// Last requested beat frequency
    pub fn beat_frequency(&self) -> f64 {
        self.beat_hz
    }

    /// Last requested carrier frequency
    pub fn carrier_frequency(&self) -> f64 {
        self.carrier_hz
    }

    pub fn set_preset(&mut self, preset: TimbrePreset, ramp_seconds: f64) {
        let now = self.now();
        self.harmonics.set_preset(preset, now, ramp_seconds);
    }

    pub fn preset(&self) -> TimbrePreset {
        self.harmonics.preset()
    }

    pub fn layers(&self) -> Vec<SignalLayer> {
        self.harmonics.layers()
    }

    pub fn set_isochronic(&mut self, enabled: bool, intensity: f32, ramp_seconds: f64) {
        let now = self.now();
        self.isochronic.set(enabled, intensity, now, ramp_seconds);
    }

    pub fn isochronic_enabled(&self) -> bool {
        self.isochronic.is_enabled()
    }

    pub fn set_spatial_position(&mut self, position: f32, ramp_seconds: f64) {
        let now = self.now();
        self.panner.set_position(position, now, ramp_seconds);
    }

    pub fn spatial_position(&self) -> f32 {
        self.panner.position()
    }

    /// Ramp the master gain; values above the ceiling are clamped by the parameter
    pub fn set_master_volume(&mut self, volume: f32, ramp_seconds: f64) {
        let now = self.now();
        self.master.linear_ramp_to(volume, now, ramp_seconds);
    }

    /// Master gain target
    pub fn master_volume(&self) -> f32 {
        self.master.target()
    }

    /// Master gain at the current audio time
    pub fn master_gain_now(&self) -> f32 {
        self.master.value_at(self.now())
    }

    pub fn volume_ceiling(&self) -> f32 {
        self.volume_ceiling
    }

    pub fn start_noise(&mut self, noise_type: NoiseType, volume: f32, fade_seconds: f64) {
        let now = self.now();
        if let Some(layer) = self.noise_layer_mut(noise_type) {
            layer.start(volume, now, fade_seconds);
        }
    }

    /// Fade a noise layer out; false if it was not running
    pub fn stop_noise(&mut self, noise_type: NoiseType, fade_seconds: f64) -> bool {
        let now = self.now();
        self.noise_layer_mut(noise_type)
            .map(|layer| layer.stop(now, fade_seconds))
            .unwrap_or(false)
    }

    pub fn set_noise_cutoff(&mut self, noise_type: NoiseType, cutoff_hz: f32) {
        if let Some(layer) = self.noise_layer_mut(noise_type) {
            layer.set_cutoff_hz(cutoff_hz);
        }
    }

    pub fn noise_state(&self, noise_type: NoiseType) -> Option<NoiseLayerState> {
        self.noise
            .iter()
            .find(|l| l.noise_type() == noise_type)
            .map(NoiseLayer::state)
    }

    pub fn noise_states(&self) -> Vec<NoiseLayerState> {
        self.noise.iter().map(NoiseLayer::state).collect()
    }

    /// Gain of a noise layer at audio time `time`
    pub fn noise_gain_at(&self, noise_type: NoiseType, time: f64) -> Option<f32> {
        self.noise
            .iter()
            .find(|l| l.noise_type() == noise_type)
            .map(|l| l.param().value_at(time))
    }

    fn noise_layer_mut(&mut self, noise_type: NoiseType) -> Option<&mut NoiseLayer> {
        self.noise.iter_mut().find(|l| l.noise_type() == noise_type)
    }

    fn params_mut(&mut self) -> Vec<&mut AudioParam> {
        let mut params: Vec<&mut AudioParam> = self.harmonics.params_mut().collect();
        params.push(self.isochronic.param_mut());
        params.push(self.panner.param_mut());
        params.extend(self.noise.iter_mut().map(NoiseLayer::param_mut));
        params.push(self.reverb.param_mut());
        params.push(&mut self.beat);
        params.push(&mut self.carrier);
        params.push(&mut self.master);
        params
    }

    fn params(&self) -> Vec<&AudioParam> {
        let mut params: Vec<&AudioParam> = self.harmonics.params().collect();
        params.push(self.isochronic.param());
        params.push(self.panner.param());
        params.extend(self.noise.iter().map(NoiseLayer::param));
        params.push(self.reverb.param());
        params.push(&self.beat);
        params.push(&self.carrier);
        params.push(&self.master);
        params
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render `buffer.len()` frames into `buffer`, advancing the audio clock
    pub fn render(&mut self, buffer: &mut AudioBuffer) {
        let frames = buffer.len();
        let gate_open = self.output_active && !self.halted;
        let ceiling = self.volume_ceiling;
        self.tap_left.clear();
        self.tap_right.clear();

        for i in 0..frames {
            let t = (self.frames_rendered + i as u64) as f64 / self.sample_rate;
            let beat = self.beat.value_at(t) as f64;
            let carrier = self.carrier.value_at(t) as f64;

            let (left_gen, right_gen) = self.harmonics.next_frame(t, carrier, beat);
            let (mut left, mut right) = self.panner.process(t, left_gen, right_gen);
            let pulse = self.isochronic.next_gain(t, beat);
            left *= pulse;
            right *= pulse;

            let noise: f32 = self.noise.iter_mut().map(|l| l.next_sample(t)).sum();
            left += noise;
            right += noise;

            let (left, right) = self.compressor.process_frame(left, right);
            let (left, right) = self.reverb.process_frame(t, left, right);

            let gain = self.master.value_at(t);
            let left = (left * gain).clamp(-ceiling, ceiling);
            let right = (right * gain).clamp(-ceiling, ceiling);

            self.tap_left.push(left);
            self.tap_right.push(right);
            if gate_open {
                buffer.samples[LEFT][i] = left;
                buffer.samples[RIGHT][i] = right;
            } else {
                buffer.samples[LEFT][i] = 0.0;
                buffer.samples[RIGHT][i] = 0.0;
            }
        }

        self.tap.push_block(&self.tap_left, &self.tap_right);
        self.frames_rendered += frames as u64;
        let now = self.now();
        for param in self.params_mut() {
            param.settle(now);
        }
    }

    /// Render a fresh block of `frames` frames
    pub fn render_block(&mut self, frames: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, self.sample_rate as u32);
        self.render(&mut buffer);
        buffer
    }
}
