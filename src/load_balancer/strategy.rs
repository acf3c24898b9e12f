//! Consultant selection strategies.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::state::ConsultantLoadState;

/// How a consultant is chosen for a new session. Hot-swappable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Fewest current sessions
    #[default]
    LeastLoaded,
    /// Rotate through eligible consultants
    RoundRobin,
    /// Load ratio plus a penalty for response time above the pool median
    ResponseTimeWeighted,
}

impl AssignmentStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AssignmentStrategy::LeastLoaded => "least_loaded",
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::ResponseTimeWeighted => "response_time_weighted",
        }
    }

    /// Pick one of `candidates`, all of which can accept a session.
    ///
    /// Candidates are expected in consultant id order. `cursor` is the
    /// round-robin position and is only advanced by `RoundRobin`.
    pub fn select_consultant<'a>(
        &self,
        candidates: &[&'a ConsultantLoadState],
        cursor: &mut usize,
    ) -> Option<&'a ConsultantLoadState> {
        if candidates.is_empty() {
            return None;
        }

        match self {
            AssignmentStrategy::LeastLoaded => candidates
                .iter()
                .copied()
                .min_by(|a, b| a.current_sessions.cmp(&b.current_sessions).then_with(|| tie_break(a, b))),
            AssignmentStrategy::RoundRobin => {
                let index = *cursor % candidates.len();
                *cursor = cursor.wrapping_add(1);
                Some(candidates[index])
            }
            AssignmentStrategy::ResponseTimeWeighted => {
                let median = median_response_secs(candidates);

                let score = |c: &ConsultantLoadState| {
                    let latency = match (c.average_response_time, median) {
                        (Some(avg), Some(median)) if median > 0.0 => {
                            (avg.as_secs_f64() / median - 1.0).clamp(0.0, 1.0)
                        }
                        _ => 0.0,
                    };
                    c.load_ratio() + latency
                };

                candidates.iter().copied().min_by(|a, b| {
                    score(a)
                        .total_cmp(&score(b))
                        .then_with(|| a.current_sessions.cmp(&b.current_sessions))
                        .then_with(|| tie_break(a, b))
                })
            }
        }
    }
}

impl std::fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Median smoothed response time over candidates that have reported
fn median_response_secs(candidates: &[&ConsultantLoadState]) -> Option<f64> {
    let mut observed: Vec<f64> = candidates
        .iter()
        .filter_map(|c| c.average_response_time)
        .map(|d| d.as_secs_f64())
        .collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(|a, b| a.total_cmp(b));
    let mid = observed.len() / 2;
    Some(if observed.len() % 2 == 0 {
        (observed[mid - 1] + observed[mid]) / 2.0
    } else {
        observed[mid]
    })
}

/// Least recently assigned first (never assigned before anything), then id
fn tie_break(a: &ConsultantLoadState, b: &ConsultantLoadState) -> Ordering {
    a.last_assignment_seq
        .cmp(&b.last_assignment_seq)
        .then_with(|| a.consultant_id.cmp(&b.consultant_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn consultant(id: &str, sessions: usize, capacity: usize, seq: Option<u64>) -> ConsultantLoadState {
        let mut state = ConsultantLoadState::new(id, capacity);
        state.current_sessions = sessions;
        state.last_assignment_seq = seq;
        state
    }

    #[test]
    fn test_least_loaded_prefers_fewest_sessions() {
        let a = consultant("a", 2, 5, Some(1));
        let b = consultant("b", 1, 5, Some(2));
        let mut cursor = 0;
        let picked = AssignmentStrategy::LeastLoaded.select_consultant(&[&a, &b], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "b");
    }

    #[test]
    fn test_least_loaded_tie_breaks() {
        let assigned_late = consultant("a", 1, 5, Some(9));
        let assigned_early = consultant("b", 1, 5, Some(3));
        let never = consultant("c", 1, 5, None);
        let mut cursor = 0;

        let picked = AssignmentStrategy::LeastLoaded
            .select_consultant(&[&assigned_late, &assigned_early], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "b");

        let picked = AssignmentStrategy::LeastLoaded
            .select_consultant(&[&assigned_late, &assigned_early, &never], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "c");

        let x = consultant("x", 0, 5, None);
        let w = consultant("w", 0, 5, None);
        let picked = AssignmentStrategy::LeastLoaded.select_consultant(&[&x, &w], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "w");
    }

    #[test]
    fn test_round_robin_rotates() {
        let a = consultant("a", 0, 5, None);
        let b = consultant("b", 3, 5, None);
        let mut cursor = 0;
        let strategy = AssignmentStrategy::RoundRobin;
        let picks: Vec<_> = (0..4)
            .map(|_| strategy.select_consultant(&[&a, &b], &mut cursor).unwrap().consultant_id.clone())
            .collect();
        assert_eq!(picks, ["a", "b", "a", "b"]);
    }

    #[test]
    fn test_response_time_weighted_avoids_slow_consultant() {
        let mut fast = consultant("fast", 1, 4, Some(1));
        fast.average_response_time = Some(Duration::from_millis(500));
        let mut slow = consultant("slow", 0, 4, Some(2));
        slow.average_response_time = Some(Duration::from_millis(4000));
        let mut cursor = 0;

        // median 2250 ms; fast: 0.25 + 0.0, slow: 0.0 + 0.78
        let picked = AssignmentStrategy::ResponseTimeWeighted.select_consultant(&[&fast, &slow], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "fast");
    }

    #[test]
    fn test_single_measured_consultant_is_not_penalized() {
        let mut measured = consultant("measured", 1, 4, Some(1));
        measured.average_response_time = Some(Duration::from_millis(120));
        let unmeasured = consultant("unmeasured", 2, 4, Some(2));
        let mut cursor = 0;

        let picked =
            AssignmentStrategy::ResponseTimeWeighted.select_consultant(&[&measured, &unmeasured], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "measured");
    }

    #[test]
    fn test_penalty_capped_for_extreme_latency() {
        let mut fast = consultant("fast", 0, 4, Some(1));
        fast.average_response_time = Some(Duration::from_millis(100));
        let mut median = consultant("median", 3, 4, Some(2));
        median.average_response_time = Some(Duration::from_millis(200));
        let mut glacial = consultant("glacial", 0, 4, Some(3));
        glacial.average_response_time = Some(Duration::from_secs(60));
        let mut cursor = 0;

        // fast 0.0, median 0.75, glacial 0.0 + 1.0 (capped)
        let picked = AssignmentStrategy::ResponseTimeWeighted
            .select_consultant(&[&fast, &median, &glacial], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "fast");
        assert_eq!(median_response_secs(&[&fast, &median, &glacial]), Some(0.2));
    }

    #[test]
    fn test_response_time_weighted_without_telemetry_uses_load() {
        let a = consultant("a", 2, 4, None);
        let b = consultant("b", 1, 4, None);
        let mut cursor = 0;
        let picked = AssignmentStrategy::ResponseTimeWeighted.select_consultant(&[&a, &b], &mut cursor);
        assert_eq!(picked.unwrap().consultant_id, "b");
    }

    #[test]
    fn test_empty_candidates() {
        let mut cursor = 0;
        assert!(AssignmentStrategy::LeastLoaded.select_consultant(&[], &mut cursor).is_none());
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_serde_names() {
        let parsed: AssignmentStrategy = serde_json::from_str("\"response_time_weighted\"").unwrap();
        assert_eq!(parsed, AssignmentStrategy::ResponseTimeWeighted);
        assert_eq!(parsed.name(), "response_time_weighted");
    }
}
