//! Session policy hook
//!
//! External policy collaborators (usage limits, clinician rules, ...) plug in
//! through [`SessionPolicy`]. The governor only forwards the request; any
//! state a policy needs lives in the policy itself.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pre-flight request for a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub protocol_id: String,
    pub duration_seconds: f64,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

pub trait SessionPolicy: Send + Sync {
    /// Decide whether a session may start
    fn check(&self, request: &PolicyRequest) -> PolicyDecision;

    /// Called once a session allowed by `check` has actually started
    fn record_start(&self, _request: &PolicyRequest) {}
}

/// Caps sessions per UTC day and the length of a single session
#[derive(Debug)]
pub struct DailyLimitPolicy {
    max_sessions_per_day: usize,
    max_session_seconds: f64,
    started: Mutex<Vec<DateTime<Utc>>>,
}

impl DailyLimitPolicy {
    pub fn new(max_sessions_per_day: usize, max_session_seconds: f64) -> Self {
        Self {
            max_sessions_per_day,
            max_session_seconds,
            started: Mutex::new(Vec::new()),
        }
    }

    /// Sessions already started on the same UTC day as `at`
    pub fn sessions_on(&self, at: DateTime<Utc>) -> usize {
        let day = at.date_naive();
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.date_naive() == day)
            .count()
    }
}

impl SessionPolicy for DailyLimitPolicy {
    fn check(&self, request: &PolicyRequest) -> PolicyDecision {
        if request.duration_seconds > self.max_session_seconds {
            return PolicyDecision::Deny {
                reason: format!(
                    "session of {:.0} s exceeds the {:.0} s limit",
                    request.duration_seconds, self.max_session_seconds
                ),
            };
        }
        let today = self.sessions_on(request.requested_at);
        if today >= self.max_sessions_per_day {
            return PolicyDecision::Deny {
                reason: format!(
                    "daily limit of {} sessions reached",
                    self.max_sessions_per_day
                ),
            };
        }
        PolicyDecision::Allow
    }

    fn record_start(&self, request: &PolicyRequest) {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.requested_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn request(at: DateTime<Utc>, duration_seconds: f64) -> PolicyRequest {
        PolicyRequest {
            protocol_id: "calm-alpha".to_string(),
            duration_seconds,
            requested_at: at,
        }
    }

    #[test]
    fn test_daily_limit() {
        let policy = DailyLimitPolicy::new(2, 3600.0);
        let morning = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        for i in 0..2 {
            let req = request(morning + Duration::hours(i), 600.0);
            assert!(policy.check(&req).is_allowed());
            policy.record_start(&req);
        }
        let evening = request(morning + Duration::hours(12), 600.0);
        assert!(!policy.check(&evening).is_allowed());

        let next_day = request(morning + Duration::days(1), 600.0);
        assert!(policy.check(&next_day).is_allowed());
    }

    #[test]
    fn test_duration_limit() {
        let policy = DailyLimitPolicy::new(10, 1200.0);
        let decision = policy.check(&request(Utc::now(), 1800.0));
        assert!(matches!(decision, PolicyDecision::Deny { .. }));
    }
}
