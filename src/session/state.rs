//! Session lifecycle states
//!
//! ```text
//! Idle -> Active <-> Paused
//!         Active -> Completing -> Completed
//!         Active | Paused -> Stopped
//! any non-terminal -> EmergencyStopped
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EntrainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Paused,
    Completing,
    Completed,
    Stopped,
    EmergencyStopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Completing => write!(f, "Completing"),
            SessionState::Completed => write!(f, "Completed"),
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::EmergencyStopped => write!(f, "EmergencyStopped"),
        }
    }
}

impl SessionState {
    /// No further transitions except a reset to a fresh session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::EmergencyStopped
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (*self, next) {
            (Idle, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active, Completing) | (Completing, Completed) => true,
            (Active, Stopped) | (Paused, Stopped) => true,
            (from, EmergencyStopped) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Move along an edge, or fail with `InvalidTransition` naming `operation`
    pub fn transition(&mut self, next: SessionState, operation: &str) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(EntrainError::InvalidTransition {
                from: self.to_string(),
                operation: operation.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}
