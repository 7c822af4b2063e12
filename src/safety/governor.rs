//! Safety governor
//!
//! Guards the two global limits of the engine: beat frequencies stay inside
//! [`MIN_BEAT_HZ`, `MAX_BEAT_HZ`] and the master output never exceeds the
//! volume ceiling. Also owns the emergency silence path and forwards
//! pre-flight checks to an optional policy collaborator.

use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

use super::policy::{PolicyDecision, PolicyRequest, SessionPolicy};
use crate::config::ABSOLUTE_MAX_CEILING;
use crate::dsp::SignalGraph;
use crate::error::{EntrainError, Result};

/// Lowest permitted beat frequency in Hz
pub const MIN_BEAT_HZ: f64 = 0.5;

/// Highest permitted beat frequency in Hz
pub const MAX_BEAT_HZ: f64 = 40.0;

/// Clamp an internally computed beat frequency into the safe range
#[inline]
pub fn clamp_beat_hz(beat_hz: f64) -> f64 {
    if beat_hz.is_nan() {
        MIN_BEAT_HZ
    } else {
        beat_hz.clamp(MIN_BEAT_HZ, MAX_BEAT_HZ)
    }
}

/// What the silence path did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceReport {
    /// Audio time at which the output was forced to zero
    pub silenced_at: f64,
    /// Ramps that were still running and got cancelled
    pub cancelled_ramps: usize,
}

#[derive(Clone)]
pub struct SafetyGovernor {
    volume_ceiling: f32,
    policy: Option<Arc<dyn SessionPolicy>>,
}

impl fmt::Debug for SafetyGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyGovernor")
            .field("volume_ceiling", &self.volume_ceiling)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

impl SafetyGovernor {
    pub fn new(volume_ceiling: f32) -> Result<Self> {
        if !(volume_ceiling > 0.0 && volume_ceiling <= ABSOLUTE_MAX_CEILING) {
            return Err(EntrainError::invalid_parameter(
                "volume_ceiling",
                volume_ceiling,
                "greater than 0 and at most 1",
            ));
        }
        Ok(Self {
            volume_ceiling,
            policy: None,
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn SessionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn volume_ceiling(&self) -> f32 {
        self.volume_ceiling
    }

    /// Reject beat frequencies outside the safe range
    ///
    /// Accepted values are returned unchanged.
    pub fn validate_beat_frequency(&self, beat_hz: f64) -> Result<f64> {
        if beat_hz.is_nan() || !(MIN_BEAT_HZ..=MAX_BEAT_HZ).contains(&beat_hz) {
            return Err(EntrainError::invalid_parameter(
                "beat_frequency",
                beat_hz,
                format!("{} to {} Hz", MIN_BEAT_HZ, MAX_BEAT_HZ),
            ));
        }
        Ok(beat_hz)
    }

    /// Cap a volume request at the ceiling
    pub fn cap_volume(&self, volume: f32) -> f32 {
        if volume.is_nan() || volume <= 0.0 {
            return 0.0;
        }
        if volume > self.volume_ceiling {
            warn!(
                requested = volume,
                ceiling = self.volume_ceiling,
                "volume request capped at safety ceiling"
            );
            return self.volume_ceiling;
        }
        volume
    }

    /// Validate a 0..=1 control value such as an intensity or noise volume
    pub fn validate_unit(&self, param: &str, value: f32) -> Result<f32> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(EntrainError::invalid_parameter(param, value, "0.0 to 1.0"));
        }
        Ok(value)
    }

    /// Cancel every ramp and force the master gain to zero at the current instant
    pub fn emergency_silence(&self, graph: &mut SignalGraph) -> SilenceReport {
        let silenced_at = graph.now();
        let cancelled_ramps = graph.halt();
        error!(silenced_at, cancelled_ramps, "emergency stop: output silenced");
        SilenceReport {
            silenced_at,
            cancelled_ramps,
        }
    }

    /// Ask the policy collaborator, if any, whether a session may start
    pub fn check_policy(&self, request: &PolicyRequest) -> Result<()> {
        let Some(policy) = &self.policy else {
            return Ok(());
        };
        match policy.check(request) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny { reason } => {
                warn!(protocol = %request.protocol_id, %reason, "session refused by policy");
                Err(EntrainError::PolicyDenied { reason })
            }
        }
    }

    /// Tell the policy collaborator a session started
    pub fn record_start(&self, request: &PolicyRequest) {
        if let Some(policy) = &self.policy {
            policy.record_start(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::DailyLimitPolicy;
    use chrono::Utc;

    #[test]
    fn test_beat_frequency_bounds() {
        let governor = SafetyGovernor::new(0.8).unwrap();
        assert_eq!(governor.validate_beat_frequency(0.5).unwrap(), 0.5);
        assert_eq!(governor.validate_beat_frequency(40.0).unwrap(), 40.0);
        assert_eq!(governor.validate_beat_frequency(13.37).unwrap(), 13.37);
        for bad in [0.49, 40.01, -1.0, f64::NAN, f64::INFINITY] {
            let err = governor.validate_beat_frequency(bad).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
        }
    }

    #[test]
    fn test_volume_capped_silently() {
        let governor = SafetyGovernor::new(0.8).unwrap();
        assert_eq!(governor.cap_volume(0.3), 0.3);
        assert_eq!(governor.cap_volume(1.0), 0.8);
        assert_eq!(governor.cap_volume(-0.2), 0.0);
        assert_eq!(governor.cap_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_invalid_ceiling() {
        assert!(SafetyGovernor::new(0.0).is_err());
        assert!(SafetyGovernor::new(1.2).is_err());
    }

    #[test]
    fn test_clamp_beat() {
        assert_eq!(clamp_beat_hz(100.0), MAX_BEAT_HZ);
        assert_eq!(clamp_beat_hz(0.1), MIN_BEAT_HZ);
        assert_eq!(clamp_beat_hz(f64::NAN), MIN_BEAT_HZ);
    }

    #[test]
    fn test_policy_forwarding() {
        let governor =
            SafetyGovernor::new(0.8).unwrap().with_policy(Arc::new(DailyLimitPolicy::new(1, 600.0)));
        let request = PolicyRequest {
            protocol_id: "deep-focus".to_string(),
            duration_seconds: 300.0,
            requested_at: Utc::now(),
        };
        assert!(governor.check_policy(&request).is_ok());
        governor.record_start(&request);
        let err = governor.check_policy(&request).unwrap_err();
        assert_eq!(err.error_code(), "POLICY_DENIED");
    }

    #[test]
    fn test_no_policy_allows() {
        let governor = SafetyGovernor::new(0.5).unwrap();
        let request = PolicyRequest {
            protocol_id: "x".to_string(),
            duration_seconds: 1e9,
            requested_at: Utc::now(),
        };
        assert!(governor.check_policy(&request).is_ok());
    }
}
