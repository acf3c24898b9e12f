//! Session-to-consultant assignment under a single lock.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{LoadBalancerError, LoadBalancerResult};
use super::state::{ConsultantLoadState, SessionAssignment};
use super::strategy::AssignmentStrategy;
use crate::config::LoadBalancerConfig;
use crate::logging::log_session_operation;
use crate::metrics::MetricsAggregator;

/// Point-in-time view of the balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerMetrics {
    /// Assignments ever made
    pub total_sessions: u64,
    pub active_sessions: usize,
    pub available_consultants: usize,
    /// Mean of current_sessions / capacity across registered consultants
    pub average_load: f64,
    pub strategy_name: String,
}

#[derive(Debug)]
struct TrackedAssignment {
    assignment: SessionAssignment,
    last_activity: Instant,
}

#[derive(Debug, Default)]
struct BalancerState {
    consultants: BTreeMap<String, ConsultantLoadState>,
    assignments: HashMap<String, TrackedAssignment>,
    strategy: AssignmentStrategy,
    round_robin_cursor: usize,
    total_sessions: u64,
    assignment_seq: u64,
    /// Bumped on every change to the active set, orders gauge publication
    version: u64,
}

enum AssignOutcome {
    Existing(String),
    Assigned(String),
}

impl BalancerState {
    fn assign(
        &mut self,
        session_id: &str,
        preferred: Option<&str>,
        idle_ttl: Duration,
    ) -> LoadBalancerResult<AssignOutcome> {
        if let Some(tracked) = self.assignments.get_mut(session_id) {
            tracked.last_activity = Instant::now();
            tracked.assignment.last_activity_at = Utc::now();
            return Ok(AssignOutcome::Existing(tracked.assignment.consultant_id.clone()));
        }

        let preferred = preferred
            .and_then(|id| self.consultants.get(id))
            .filter(|c| c.can_accept())
            .map(|c| c.consultant_id.clone());

        let consultant_id = match preferred {
            Some(id) => id,
            None => {
                let candidates: Vec<&ConsultantLoadState> =
                    self.consultants.values().filter(|c| c.can_accept()).collect();
                self.strategy
                    .select_consultant(&candidates, &mut self.round_robin_cursor)
                    .map(|c| c.consultant_id.clone())
                    .ok_or_else(|| LoadBalancerError::NoAvailableConsultant {
                        session_id: session_id.to_string(),
                    })?
            }
        };

        let consultant = self.consultants.get_mut(&consultant_id).ok_or_else(|| {
            LoadBalancerError::UnknownConsultant {
                consultant_id: consultant_id.clone(),
            }
        })?;

        let now = Utc::now();
        self.assignment_seq += 1;
        consultant.current_sessions += 1;
        consultant.total_assignments += 1;
        consultant.last_assigned_at = Some(now);
        consultant.last_assignment_seq = Some(self.assignment_seq);
        self.total_sessions += 1;

        self.assignments.insert(
            session_id.to_string(),
            TrackedAssignment {
                assignment: SessionAssignment {
                    session_id: session_id.to_string(),
                    consultant_id: consultant_id.clone(),
                    assigned_at: now,
                    last_activity_at: now,
                    idle_ttl,
                },
                last_activity: Instant::now(),
            },
        );

        Ok(AssignOutcome::Assigned(consultant_id))
    }

    fn release(&mut self, session_id: &str) -> LoadBalancerResult<String> {
        let tracked = self.assignments.remove(session_id).ok_or_else(|| {
            LoadBalancerError::SessionNotAssigned {
                session_id: session_id.to_string(),
            }
        })?;

        let consultant_id = tracked.assignment.consultant_id;
        if let Some(consultant) = self.consultants.get_mut(&consultant_id) {
            consultant.current_sessions = consultant.current_sessions.saturating_sub(1);
        }
        Ok(consultant_id)
    }

    /// Version and size of the active set after a change
    fn active_snapshot(&mut self) -> (u64, u64) {
        self.version += 1;
        (self.version, self.assignments.len() as u64)
    }
}

/// Assigns sessions to consultants and tracks their load
///
/// One mutex guards the assignment map, the consultant counters and the active
/// strategy, so an assignment and its load increment are a single atomic unit.
/// Metrics are published after the lock is released; a snapshot older than the
/// last one published is dropped.
#[derive(Debug)]
pub struct SessionLoadBalancer {
    state: Mutex<BalancerState>,
    config: LoadBalancerConfig,
    metrics: Option<Arc<MetricsAggregator>>,
    published_version: Mutex<u64>,
}

impl SessionLoadBalancer {
    /// Create a balancer with the consultants listed in `config`
    pub fn new(config: LoadBalancerConfig) -> Self {
        if let Err(error) = config.validate() {
            warn!(error = %error, "Session load balancer created with invalid configuration");
        }

        let mut state = BalancerState {
            strategy: config.strategy,
            ..BalancerState::default()
        };

        for consultant in &config.consultants {
            let capacity = consultant.capacity.unwrap_or(config.default_consultant_capacity);
            if state.consultants.contains_key(&consultant.id) {
                warn!(consultant_id = %consultant.id, "Duplicate consultant in configuration ignored");
                continue;
            }
            state
                .consultants
                .insert(consultant.id.clone(), ConsultantLoadState::new(&consultant.id, capacity));
        }

        info!(
            consultants = state.consultants.len(),
            strategy = %state.strategy,
            idle_ttl_seconds = config.session_idle_ttl_seconds,
            "Session load balancer created"
        );

        Self {
            state: Mutex::new(state),
            config,
            metrics: None,
            published_version: Mutex::new(0),
        }
    }

    /// Publish assignment failures and active session counts to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register_consultant(&self, consultant_id: &str, capacity: usize) -> LoadBalancerResult<()> {
        if capacity == 0 {
            return Err(LoadBalancerError::InvalidCapacity {
                consultant_id: consultant_id.to_string(),
                capacity,
            });
        }

        let mut state = self.state.lock();
        if state.consultants.contains_key(consultant_id) {
            return Err(LoadBalancerError::ConsultantAlreadyRegistered {
                consultant_id: consultant_id.to_string(),
            });
        }
        state
            .consultants
            .insert(consultant_id.to_string(), ConsultantLoadState::new(consultant_id, capacity));
        drop(state);

        debug!(consultant_id = %consultant_id, capacity = capacity, "Consultant registered");
        Ok(())
    }

    pub fn unregister_consultant(&self, consultant_id: &str) -> LoadBalancerResult<()> {
        let mut state = self.state.lock();
        let consultant = state.consultants.get(consultant_id).ok_or_else(|| {
            LoadBalancerError::UnknownConsultant {
                consultant_id: consultant_id.to_string(),
            }
        })?;
        if consultant.current_sessions > 0 {
            return Err(LoadBalancerError::ConsultantHasActiveSessions {
                consultant_id: consultant_id.to_string(),
                active_sessions: consultant.current_sessions,
            });
        }
        state.consultants.remove(consultant_id);
        drop(state);

        debug!(consultant_id = %consultant_id, "Consultant unregistered");
        Ok(())
    }

    /// Mark a consultant online or offline. Existing sessions are kept.
    pub fn set_availability(&self, consultant_id: &str, available: bool) -> LoadBalancerResult<()> {
        let mut state = self.state.lock();
        let consultant = state.consultants.get_mut(consultant_id).ok_or_else(|| {
            LoadBalancerError::UnknownConsultant {
                consultant_id: consultant_id.to_string(),
            }
        })?;
        consultant.available = available;
        Ok(())
    }

    /// Fold an observed response time into the consultant's smoothed average
    pub fn record_response_time(&self, consultant_id: &str, observed: Duration) -> LoadBalancerResult<()> {
        let mut state = self.state.lock();
        let consultant = state.consultants.get_mut(consultant_id).ok_or_else(|| {
            LoadBalancerError::UnknownConsultant {
                consultant_id: consultant_id.to_string(),
            }
        })?;
        consultant.record_response_time(observed);
        Ok(())
    }

    /// Assign a session, or return its existing consultant.
    ///
    /// A preferred consultant is used when it can accept the session;
    /// otherwise the active strategy chooses.
    pub fn assign_session(
        &self,
        session_id: &str,
        preferred_consultant_id: Option<&str>,
    ) -> LoadBalancerResult<String> {
        let (outcome, snapshot) = {
            let mut state = self.state.lock();
            let outcome = state.assign(session_id, preferred_consultant_id, self.config.session_idle_ttl());
            let snapshot = matches!(outcome, Ok(AssignOutcome::Assigned(_))).then(|| state.active_snapshot());
            (outcome, snapshot)
        };

        match outcome {
            Ok(AssignOutcome::Existing(consultant_id)) => {
                debug!(session_id = %session_id, consultant_id = %consultant_id, "Session already assigned");
                Ok(consultant_id)
            }
            Ok(AssignOutcome::Assigned(consultant_id)) => {
                if let Some((version, active)) = snapshot {
                    self.publish_active(version, active);
                }
                log_session_operation("assign", session_id, Some(&consultant_id), "assigned", None);
                Ok(consultant_id)
            }
            Err(error) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_assignment_failure();
                }
                log_session_operation("assign", session_id, None, "failed", Some(&error.to_string()));
                Err(error)
            }
        }
    }

    /// Release a session. Returns the consultant it was assigned to.
    pub fn release_session(&self, session_id: &str) -> LoadBalancerResult<String> {
        let (consultant_id, (version, active)) = {
            let mut state = self.state.lock();
            let consultant_id = state.release(session_id)?;
            (consultant_id, state.active_snapshot())
        };

        self.publish_active(version, active);
        log_session_operation("release", session_id, Some(&consultant_id), "released", None);
        Ok(consultant_id)
    }

    /// Refresh a session's last activity so it is not expired
    pub fn touch_session(&self, session_id: &str) -> LoadBalancerResult<()> {
        let mut state = self.state.lock();
        let tracked = state.assignments.get_mut(session_id).ok_or_else(|| {
            LoadBalancerError::SessionNotAssigned {
                session_id: session_id.to_string(),
            }
        })?;
        tracked.last_activity = Instant::now();
        tracked.assignment.last_activity_at = Utc::now();
        Ok(())
    }

    /// Release every assignment idle for longer than the configured TTL.
    /// Returns how many were released.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let idle_ttl = self.config.session_idle_ttl();
        let (released, snapshot) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let expired: Vec<String> = state
                .assignments
                .iter()
                .filter(|(_, tracked)| now.saturating_duration_since(tracked.last_activity) > idle_ttl)
                .map(|(session_id, _)| session_id.clone())
                .collect();

            let released: Vec<(String, String)> = expired
                .into_iter()
                .filter_map(|session_id| {
                    state
                        .release(&session_id)
                        .ok()
                        .map(|consultant_id| (session_id, consultant_id))
                })
                .collect();
            let snapshot = (!released.is_empty()).then(|| state.active_snapshot());
            (released, snapshot)
        };

        let Some((version, active)) = snapshot else {
            return 0;
        };

        for (session_id, consultant_id) in &released {
            log_session_operation("expire", session_id, Some(consultant_id), "released", Some("idle timeout"));
        }
        self.publish_active(version, active);
        info!(released = released.len(), "Released idle session assignments");
        released.len()
    }

    /// Run `cleanup_expired_sessions` every cleanup interval until `shutdown`
    /// is cancelled
    pub fn run_cleanup_loop(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let balancer = Arc::clone(self);
        let interval = self.config.cleanup_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            info!(interval_seconds = interval.as_secs(), "Session cleanup loop started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Session cleanup loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        balancer.cleanup_expired_sessions();
                    }
                }
            }
        })
    }

    /// Pick a strategy from the available response-time telemetry: weighted
    /// by response time when any consultant has reported, least-loaded
    /// otherwise. Returns the strategy now in effect.
    pub fn optimize_for_response_time(&self) -> AssignmentStrategy {
        let observed = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.consultant_response_times())
            .unwrap_or_default();

        let (previous, strategy) = {
            let mut state = self.state.lock();
            for (consultant_id, average) in observed {
                if let Some(consultant) = state.consultants.get_mut(&consultant_id) {
                    consultant.average_response_time = Some(average);
                }
            }

            let has_telemetry = state
                .consultants
                .values()
                .any(|c| c.average_response_time.is_some());
            let strategy = if has_telemetry {
                AssignmentStrategy::ResponseTimeWeighted
            } else {
                AssignmentStrategy::LeastLoaded
            };
            let previous = std::mem::replace(&mut state.strategy, strategy);
            (previous, strategy)
        };

        if previous != strategy {
            info!(from = %previous, to = %strategy, "Assignment strategy changed");
        }
        strategy
    }

    pub fn set_strategy(&self, strategy: AssignmentStrategy) {
        let previous = std::mem::replace(&mut self.state.lock().strategy, strategy);
        if previous != strategy {
            info!(from = %previous, to = %strategy, "Assignment strategy changed");
        }
    }

    pub fn strategy(&self) -> AssignmentStrategy {
        self.state.lock().strategy
    }

    pub fn metrics(&self) -> LoadBalancerMetrics {
        let state = self.state.lock();
        let available_consultants = state.consultants.values().filter(|c| c.available).count();
        let average_load = if state.consultants.is_empty() {
            0.0
        } else {
            state.consultants.values().map(|c| c.load_ratio()).sum::<f64>()
                / state.consultants.len() as f64
        };

        LoadBalancerMetrics {
            total_sessions: state.total_sessions,
            active_sessions: state.assignments.len(),
            available_consultants,
            average_load,
            strategy_name: state.strategy.name().to_string(),
        }
    }

    pub fn consultant_load(&self, consultant_id: &str) -> Option<ConsultantLoadState> {
        self.state.lock().consultants.get(consultant_id).cloned()
    }

    /// Snapshot of every consultant in id order
    pub fn consultants(&self) -> Vec<ConsultantLoadState> {
        self.state.lock().consultants.values().cloned().collect()
    }

    pub fn assignment(&self, session_id: &str) -> Option<SessionAssignment> {
        self.state
            .lock()
            .assignments
            .get(session_id)
            .map(|tracked| tracked.assignment.clone())
    }

    fn publish_active(&self, version: u64, active: u64) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let mut published = self.published_version.lock();
        if version <= *published {
            return;
        }
        *published = version;
        metrics.record_active_sessions(active);
    }
}
