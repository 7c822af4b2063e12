//! Error handling for Entrain
//!
//! Every fallible operation in the engine returns [`EntrainError`]. Variants
//! carry enough context to be logged or shown to an operator, and expose a
//! stable error code plus recovery suggestions.

use thiserror::Error;

/// Result type alias for Entrain operations
pub type Result<T> = std::result::Result<T, EntrainError>;

/// Main error type for Entrain operations
#[derive(Error, Debug)]
pub enum EntrainError {
    // Engine Errors
    #[error("Initialization failed: {reason}")]
    InitializationFailure { reason: String },

    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Cannot start a session while the engine is {state}")]
    ConcurrentStartFailure { state: String },

    #[error("Cannot {operation} while the session is {from}")]
    InvalidTransition { from: String, operation: String },

    #[error("Session refused by policy: {reason}")]
    PolicyDenied { reason: String },

    // Protocol Errors
    #[error("Invalid protocol: {reason}")]
    ProtocolInvalid { reason: String },

    #[error("Protocol not found: {id}")]
    ProtocolNotFound { id: String },

    // Collaborator Errors
    #[error("Persistence failed: {reason}")]
    PersistenceFailure { reason: String },

    #[error("Output device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl EntrainError {
    /// Shorthand for an [`EntrainError::InvalidParameter`]
    pub fn invalid_parameter(
        param: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        EntrainError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EntrainError::InitializationFailure { .. } => "INITIALIZATION_FAILURE",
            EntrainError::InvalidParameter { .. } => "INVALID_PARAMETER",
            EntrainError::ConcurrentStartFailure { .. } => "CONCURRENT_START_FAILURE",
            EntrainError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EntrainError::PolicyDenied { .. } => "POLICY_DENIED",
            EntrainError::ProtocolInvalid { .. } => "PROTOCOL_INVALID",
            EntrainError::ProtocolNotFound { .. } => "PROTOCOL_NOT_FOUND",
            EntrainError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            EntrainError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            EntrainError::Io(_) => "IO_ERROR",
            EntrainError::Serialization(_) => "SERIALIZATION_ERROR",
            EntrainError::Wav(_) => "WAV_ERROR",
        }
    }

    /// Check if the caller can retry or continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EntrainError::InvalidParameter { .. }
                | EntrainError::ConcurrentStartFailure { .. }
                | EntrainError::InvalidTransition { .. }
                | EntrainError::PersistenceFailure { .. }
                | EntrainError::ProtocolNotFound { .. }
                | EntrainError::PolicyDenied { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            EntrainError::InitializationFailure { .. } => vec![
                "Check the engine configuration values",
                "Verify the sample rate and block size are supported",
            ],
            EntrainError::InvalidParameter { .. } => vec![
                "Beat frequencies must be between 0.5 and 40 Hz",
                "Volumes and intensities must be between 0 and 1",
            ],
            EntrainError::ConcurrentStartFailure { .. } => vec![
                "Stop the running session before starting a new one",
                "Call reset() after a session has finished",
            ],
            EntrainError::PersistenceFailure { .. } => vec![
                "The session record was written to the local spool",
                "Run 'entrain-cli spool retry' once storage is reachable",
            ],
            EntrainError::DeviceUnavailable { .. } => vec![
                "Check that the audio output device is connected",
                "Output has been silenced regardless of the device state",
            ],
            EntrainError::PolicyDenied { .. } => vec![
                "Daily session limits reset at midnight UTC",
                "Choose a shorter session duration",
            ],
            EntrainError::ProtocolInvalid { .. } => vec![
                "Phase durations must sum to 1.0",
                "Every phase frequency must stay within 0.5 to 40 Hz",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EntrainError::invalid_parameter("beat_hz", 45.0, "0.5 to 40 Hz");
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("beat_hz"));
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = EntrainError::ConcurrentStartFailure {
            state: "Active".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_initialization_failure_is_fatal() {
        let err = EntrainError::InitializationFailure {
            reason: "cycle in graph".to_string(),
        };
        assert!(!err.is_recoverable());
    }
}
