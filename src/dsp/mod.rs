//! Signal synthesis graph
//!
//! Building blocks of the entrainment signal path and the [`SignalGraph`]
//! that wires them together. Every audible parameter is an [`AudioParam`]
//! that moves by linear ramps on the audio clock.

mod analyser;
mod compressor;
mod graph;
mod harmonic;
mod isochronic;
mod noise;
mod oscillator;
mod panner;
mod param;
mod reverb;
mod topology;

pub use analyser::{AnalysisTap, MIN_DECIBELS};
pub use compressor::{Compressor, CompressorSettings};
pub use graph::SignalGraph;
pub use harmonic::{layer_gain, HarmonicBank, SignalLayer, TimbrePreset};
pub use isochronic::IsochronicModulator;
pub use noise::{generate_noise, NoiseLayer, NoiseLayerState, NoiseType};
pub use oscillator::SineOscillator;
pub use panner::{equal_power, SpatialPanner, SPREAD};
pub use param::{AudioParam, Ramp};
pub use reverb::ReverbSend;
pub use topology::{Connection, GraphTopology, NodeId, NodeKind};
