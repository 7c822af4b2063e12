//! Entrain - real-time audio entrainment engine
//!
//! Runs timed, multi-phase entrainment sessions: a phase sequencer walks a
//! [`Protocol`](protocol::Protocol), computes the instantaneous beat
//! frequency for each phase, and drives a layered synthesis graph (binaural
//! harmonic bank, isochronic pulse, ambient noise, panner, compressor, reverb)
//! under a safety governor that bounds frequency and volume and can silence
//! output immediately.
//!
//! # Architecture
//!
//! - [`trajectory`]: pure beat-frequency and carrier-band functions
//! - [`dsp`]: the signal graph and its nodes
//! - [`session`]: lifecycle state machine, phase sequencer, tick scheduler
//! - [`safety`]: governor and policy hook
//! - [`metrics`]: simulated cognitive metrics and session records
//! - [`state`]: persistence hand-off with a durable spool
//! - [`engine`]: the [`EntrainmentEngine`](engine::EntrainmentEngine) control surface

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod safety;
pub mod session;
pub mod state;
pub mod trajectory;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, EngineSnapshot, EntrainmentEngine};
pub use error::{EntrainError, Result};
