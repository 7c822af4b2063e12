//! Simulated cognitive metrics and session records

mod emitter;
mod records;

pub use emitter::{baseline, simulate, MetricsEmitter, PERTURBATION};
pub use records::{
    CognitiveMetrics, CognitiveMetricsSample, PersistenceRecord, SessionRecord,
    SessionStartRecord, SessionStatus,
};
