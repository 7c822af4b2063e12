//! Session lifecycle: state machine, phase sequencer and tick scheduler

mod scheduler;
mod sequencer;
mod state;

pub use scheduler::{spawn as spawn_scheduler, SchedulerExit, SchedulerHandle};
pub use sequencer::{
    EmergencyOutcome, PhaseSequencer, SequencerSettings, Session, TickOutcome,
};
pub use state::SessionState;
