//! Consultant load and session assignment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::system::RESPONSE_TIME_EWMA_ALPHA;

/// Load bookkeeping for one consultant, mutated only under the balancer lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultantLoadState {
    pub consultant_id: String,
    pub current_sessions: usize,
    pub capacity: usize,
    pub available: bool,
    pub last_assigned_at: Option<DateTime<Utc>>,
    /// Smoothed upstream response time, once any has been reported
    pub average_response_time: Option<Duration>,
    pub total_assignments: u64,
    /// Monotonic assignment order; `None` sorts before every assigned consultant
    #[serde(skip)]
    pub(crate) last_assignment_seq: Option<u64>,
}

impl ConsultantLoadState {
    pub fn new(consultant_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            consultant_id: consultant_id.into(),
            current_sessions: 0,
            capacity,
            available: true,
            last_assigned_at: None,
            average_response_time: None,
            total_assignments: 0,
            last_assignment_seq: None,
        }
    }

    /// Available and below capacity
    pub fn can_accept(&self) -> bool {
        self.available && self.current_sessions < self.capacity
    }

    pub fn load_ratio(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.current_sessions as f64 / self.capacity as f64
        }
    }

    pub(crate) fn record_response_time(&mut self, observed: Duration) {
        let smoothed = match self.average_response_time {
            Some(previous) => {
                let value = RESPONSE_TIME_EWMA_ALPHA * observed.as_secs_f64()
                    + (1.0 - RESPONSE_TIME_EWMA_ALPHA) * previous.as_secs_f64();
                Duration::from_secs_f64(value.max(0.0))
            }
            None => observed,
        };
        self.average_response_time = Some(smoothed);
    }
}

/// Binding of one session to one consultant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAssignment {
    pub session_id: String,
    pub consultant_id: String,
    pub assigned_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub idle_ttl: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_accept() {
        let mut state = ConsultantLoadState::new("c-1", 1);
        assert!(state.can_accept());
        state.current_sessions = 1;
        assert!(!state.can_accept());
        state.current_sessions = 0;
        state.available = false;
        assert!(!state.can_accept());
    }

    #[test]
    fn test_response_time_is_smoothed() {
        let mut state = ConsultantLoadState::new("c-1", 1);
        state.record_response_time(Duration::from_millis(1000));
        assert_eq!(state.average_response_time, Some(Duration::from_millis(1000)));

        state.record_response_time(Duration::from_millis(2000));
        let smoothed = state.average_response_time.unwrap().as_secs_f64();
        assert!((smoothed - 1.3).abs() < 1e-9);
    }
}
