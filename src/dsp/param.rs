//! Parameter automation
//!
//! Every audible parameter of the synthesis graph is an [`AudioParam`]. Values
//! never jump: callers schedule linear ramps against the audio clock and the
//! render loop samples `value_at(t)` once per frame.

/// A scheduled linear transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub start_time: f64,
    pub start_value: f32,
    pub end_time: f64,
    pub end_value: f32,
}

impl Ramp {
    fn value_at(&self, time: f64) -> f32 {
        if time <= self.start_time {
            return self.start_value;
        }
        if time >= self.end_time {
            return self.end_value;
        }
        let t = ((time - self.start_time) / (self.end_time - self.start_time)) as f32;
        self.start_value + (self.end_value - self.start_value) * t
    }
}

/// Automatable graph parameter with a value range
#[derive(Debug, Clone)]
pub struct AudioParam {
    name: &'static str,
    /// Value held once any ramp has finished
    value: f32,
    ramp: Option<Ramp>,
    min: f32,
    max: f32,
}

impl AudioParam {
    pub fn new(name: &'static str, value: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            value: value.clamp(min, max),
            ramp: None,
            min,
            max,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value at audio time `time`
    #[inline]
    pub fn value_at(&self, time: f64) -> f32 {
        match &self.ramp {
            Some(ramp) => ramp.value_at(time),
            None => self.value,
        }
    }

    /// Value the parameter will settle on
    pub fn target(&self) -> f32 {
        self.value
    }

    /// End time of the in-flight ramp, if any
    pub fn scheduled_end(&self) -> Option<f64> {
        self.ramp.map(|r| r.end_time)
    }

    /// The in-flight ramp, if any
    pub fn ramp(&self) -> Option<Ramp> {
        self.ramp
    }

    pub fn is_ramping(&self, time: f64) -> bool {
        self.ramp.map(|r| time < r.end_time).unwrap_or(false)
    }

    /// Jump to a value immediately, dropping any ramp
    pub fn set_value(&mut self, value: f32) {
        self.value = value.clamp(self.min, self.max);
        self.ramp = None;
    }

    /// Ramp linearly from the current value at `now` to `target` over `duration` seconds
    ///
    /// A non-positive duration sets the value immediately.
    pub fn linear_ramp_to(&mut self, target: f32, now: f64, duration: f64) {
        let target = target.clamp(self.min, self.max);
        if duration <= 0.0 || !duration.is_finite() {
            self.set_value(target);
            return;
        }
        let start_value = self.value_at(now);
        self.ramp = Some(Ramp {
            start_time: now,
            start_value,
            end_time: now + duration,
            end_value: target,
        });
        self.value = target;
    }

    /// Cancel any ramp and hold the value reached at `now`
    ///
    /// Returns true if a ramp was still in flight.
    pub fn cancel_and_hold(&mut self, now: f64) -> bool {
        let in_flight = self.is_ramping(now);
        self.value = self.value_at(now);
        self.ramp = None;
        in_flight
    }

    /// Drop a ramp that has completed by `now`
    #[inline]
    pub fn settle(&mut self, now: f64) {
        if let Some(ramp) = self.ramp {
            if now >= ramp.end_time {
                self.ramp = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_ramp_values() {
        let mut param = AudioParam::new("gain", 0.0, 0.0, 1.0);
        param.linear_ramp_to(1.0, 1.0, 2.0);
        assert_eq!(param.value_at(0.5), 0.0);
        assert_relative_eq!(param.value_at(2.0), 0.5);
        assert_eq!(param.value_at(3.0), 1.0);
        assert_eq!(param.target(), 1.0);
        assert_eq!(param.scheduled_end(), Some(3.0));
    }

    #[test]
    fn test_ramp_starts_from_current_value() {
        let mut param = AudioParam::new("gain", 0.0, 0.0, 1.0);
        param.linear_ramp_to(1.0, 0.0, 1.0);
        param.linear_ramp_to(0.0, 0.5, 1.0);
        assert_relative_eq!(param.value_at(0.5), 0.5);
        assert_relative_eq!(param.value_at(1.0), 0.25);
    }

    #[test]
    fn test_cancel_and_hold() {
        let mut param = AudioParam::new("gain", 0.0, 0.0, 1.0);
        param.linear_ramp_to(1.0, 0.0, 1.0);
        assert!(param.cancel_and_hold(0.25));
        assert_eq!(param.scheduled_end(), None);
        assert_relative_eq!(param.value_at(10.0), 0.25);
        assert!(!param.cancel_and_hold(0.5));
    }

    #[test]
    fn test_values_are_clamped() {
        let mut param = AudioParam::new("pan", 0.0, -1.0, 1.0);
        param.linear_ramp_to(3.0, 0.0, 0.0);
        assert_eq!(param.target(), 1.0);
    }

    #[test]
    fn test_settle_drops_finished_ramp() {
        let mut param = AudioParam::new("gain", 0.0, 0.0, 1.0);
        param.linear_ramp_to(0.5, 0.0, 0.1);
        param.settle(0.05);
        assert!(param.ramp().is_some());
        param.settle(0.2);
        assert!(param.ramp().is_none());
        assert_eq!(param.value_at(0.2), 0.5);
    }
}
