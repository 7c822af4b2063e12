//! Safety limits, emergency silence and the session policy hook

mod governor;
mod policy;

pub use governor::{clamp_beat_hz, SafetyGovernor, SilenceReport, MAX_BEAT_HZ, MIN_BEAT_HZ};
pub use policy::{DailyLimitPolicy, PolicyDecision, PolicyRequest, SessionPolicy};
