//! Audio Engine Module
//!
//! The engine control surface and what it renders into:
//! - Audio buffers
//! - Session clocks
//! - Output devices
//! - The [`EntrainmentEngine`] controller

pub mod buffer;
pub mod clock;
pub mod controller;
pub mod output;

pub use buffer::{db_to_linear, linear_to_db, AudioBuffer, LEFT, OUTPUT_CHANNELS, RIGHT};
pub use clock::{ManualClock, MonotonicClock, SessionClock};
pub use controller::{EmergencyStopReport, EngineBuilder, EngineSnapshot, EntrainmentEngine};
pub use output::{NullOutput, OutputDevice, WavOutput};
