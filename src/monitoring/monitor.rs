//! # Performance Monitor
//!
//! Samples the metrics aggregator on an interval, evaluates threshold rules
//! and fires or resolves alerts. Rule state lives in a `DashMap`; handlers are
//! cloned out of their lock before being invoked so evaluation never holds a
//! lock across an await.

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::alerts::{default_rules, AlertInstance, AlertRule, AlertTransition};
use super::errors::{MonitoringError, MonitoringResult};
use super::handlers::AlertHandler;
use crate::cache::AnalysisCache;
use crate::config::{ConfigResult, MonitoringConfig};
use crate::constants::labels;
use crate::logging::{log_alert_transition, log_error};
use crate::metrics::{otel, MetricSample, MetricsAggregator, PerformanceReport};

#[derive(Debug)]
struct RuleState {
    rule: AlertRule,
    consecutive_breaches: u32,
    active: Option<AlertInstance>,
    last_fired: Option<Instant>,
}

impl RuleState {
    fn new(rule: AlertRule) -> Self {
        Self {
            rule,
            consecutive_breaches: 0,
            active: None,
            last_fired: None,
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_fired
            .map(|fired| now.saturating_duration_since(fired) >= self.rule.cooldown())
            .unwrap_or(true)
    }

    /// Apply one observation; `None` leaves the rule untouched
    fn evaluate(&mut self, value: Option<f64>, now: Instant) -> Option<AlertTransition> {
        let value = value?;

        if !self.rule.comparator.breached(value, self.rule.threshold) {
            self.consecutive_breaches = 0;
            return self.active.take().map(|mut alert| {
                alert.resolve();
                AlertTransition::Resolved(alert)
            });
        }

        self.consecutive_breaches = self.consecutive_breaches.saturating_add(1);
        if self.active.is_some()
            || self.consecutive_breaches < self.rule.sustain
            || !self.cooldown_elapsed(now)
        {
            return None;
        }

        let alert = AlertInstance::fire(&self.rule, value);
        self.active = Some(alert.clone());
        self.last_fired = Some(now);
        Some(AlertTransition::Fired(alert))
    }
}

type NamedHandler = (String, Arc<dyn AlertHandler>);

/// Threshold alerting over the metrics aggregator
pub struct PerformanceMonitor {
    metrics: Arc<MetricsAggregator>,
    config: MonitoringConfig,
    cache: RwLock<Option<Arc<AnalysisCache>>>,
    rules: DashMap<String, RuleState>,
    handlers: RwLock<Vec<NamedHandler>>,
    history: Mutex<VecDeque<AlertInstance>>,
    last_report: Mutex<Option<PerformanceReport>>,
    /// Assignment failure total at the previous evaluation
    assignment_failures_seen: AtomicU64,
    evaluations: AtomicU64,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("rules", &self.rules.len())
            .field("handlers", &self.handlers.read().len())
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

impl PerformanceMonitor {
    /// Create a monitor over `metrics`, installing the default rules when
    /// configured plus any rules listed in `config`
    pub fn new(config: MonitoringConfig, metrics: Arc<MetricsAggregator>) -> Self {
        if let Err(error) = config.validate() {
            warn!(error = %error, "Performance monitor created with invalid configuration");
        }

        let rules = DashMap::new();
        let configured = if config.install_default_rules {
            default_rules()
        } else {
            Vec::new()
        };
        for rule in configured.into_iter().chain(config.rules.iter().cloned()) {
            rules.insert(rule.id.clone(), RuleState::new(rule));
        }

        info!(
            rules = rules.len(),
            evaluation_interval_seconds = config.evaluation_interval_seconds,
            handler_timeout_ms = config.handler_timeout_ms,
            "Performance monitor created"
        );

        Self {
            metrics,
            config,
            cache: RwLock::new(None),
            rules,
            handlers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            last_report: Mutex::new(None),
            assignment_failures_seen: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Pull cache statistics from `cache` before every report
    pub fn attach_cache(&self, cache: Arc<AnalysisCache>) {
        *self.cache.write() = Some(cache);
    }

    pub fn record_request(&self, success: bool, duration: Duration) {
        self.metrics.record_request(success, duration);
    }

    pub fn record_cache_metrics(
        &self,
        hits: u64,
        misses: u64,
        size: usize,
        evictions: u64,
        average_entry_age: Duration,
    ) {
        self.metrics
            .record_cache_metrics(hits, misses, size, evictions, average_entry_age);
    }

    pub fn record_system_metrics(
        &self,
        cpu_percent: f64,
        memory_percent: f64,
        active_workers: usize,
        memory_bytes: u64,
        gc_pause: Duration,
    ) {
        self.metrics.record_system_metrics(
            cpu_percent,
            memory_percent,
            active_workers,
            memory_bytes,
            gc_pause,
        );
    }

    pub fn record_assignment_failure(&self) {
        self.metrics.record_assignment_failure();
    }

    pub fn record_active_sessions(&self, active: u64) {
        self.metrics.record_active_sessions(active);
    }

    /// Fold an arbitrary named sample into the report's custom section
    pub fn record_sample(&self, sample: MetricSample) {
        self.metrics.record_sample(sample);
    }

    /// Current snapshot. Sources that have not reported yield empty sections.
    pub fn report(&self) -> PerformanceReport {
        self.refresh_cache_metrics();
        self.metrics.report()
    }

    /// The report computed by the most recent evaluation pass
    pub fn last_report(&self) -> MonitoringResult<PerformanceReport> {
        self.last_report
            .lock()
            .clone()
            .ok_or_else(|| MonitoringError::SnapshotUnavailable {
                reason: "no evaluation has completed yet".to_string(),
            })
    }

    fn refresh_cache_metrics(&self) {
        let cache = self.cache.read().clone();
        if let Some(cache) = cache {
            let stats = cache.statistics();
            self.metrics.record_cache_metrics(
                stats.hits,
                stats.misses,
                stats.cache_size,
                stats.evictions,
                stats.average_entry_age,
            );
        }
    }

    pub fn register_alert_handler(&self, name: impl Into<String>, handler: Arc<dyn AlertHandler>) {
        let name = name.into();
        debug!(handler = %name, "Alert handler registered");
        self.handlers.write().push((name, handler));
    }

    /// Add a rule, replacing any rule with the same id along with its state
    pub fn register_rule(&self, rule: AlertRule) -> ConfigResult<()> {
        rule.validate()?;
        debug!(rule_id = %rule.id, "Alert rule registered");
        self.rules.insert(rule.id.clone(), RuleState::new(rule));
        Ok(())
    }

    pub fn remove_rule(&self, rule_id: &str) -> bool {
        self.rules.remove(rule_id).is_some()
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self.rules.iter().map(|state| state.rule.clone()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn active_alerts(&self) -> Vec<AlertInstance> {
        let mut alerts: Vec<AlertInstance> = self
            .rules
            .iter()
            .filter_map(|state| state.active.clone())
            .collect();
        alerts.sort_by(|a, b| a.fired_at.cmp(&b.fired_at));
        alerts
    }

    /// Fired alerts, oldest first, updated in place when they resolve
    pub fn alert_history(&self) -> Vec<AlertInstance> {
        self.history.lock().iter().cloned().collect()
    }

    /// Run one evaluation pass and notify handlers of any alerts that fired.
    /// Returns the transitions in rule id order.
    pub async fn evaluate_alerts(&self) -> Vec<AlertTransition> {
        let report = self.report();
        let failures_total = report.sessions.assignment_failures;
        let previous = self.assignment_failures_seen.swap(failures_total, Ordering::Relaxed);
        let new_failures = failures_total.saturating_sub(previous);
        let now = Instant::now();

        let mut fired_rules = Vec::new();
        let mut transitions: Vec<AlertTransition> = self
            .rules
            .iter_mut()
            .filter_map(|mut state| {
                let value = state.rule.metric.observe(&report, new_failures);
                let transition = state.evaluate(value, now)?;
                if transition.is_fired() {
                    fired_rules.push(state.rule.clone());
                }
                Some(transition)
            })
            .collect();
        transitions.sort_by(|a, b| a.alert().rule_id.cmp(&b.alert().rule_id));

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        *self.last_report.lock() = Some(report);

        for transition in &transitions {
            self.record_transition(transition);
        }

        for transition in &transitions {
            if let AlertTransition::Fired(alert) = transition {
                if let Some(rule) = fired_rules.iter().find(|rule| rule.id == alert.rule_id) {
                    self.notify_handlers(alert, rule).await;
                }
            }
        }

        transitions
    }

    fn record_transition(&self, transition: &AlertTransition) {
        let alert = transition.alert();
        let mut history = self.history.lock();
        match transition {
            AlertTransition::Fired(alert) => {
                history.push_back(alert.clone());
                while history.len() > self.config.alert_history_size {
                    history.pop_front();
                }
                otel::instruments().alerts_fired_total.add(
                    1,
                    &[
                        KeyValue::new(labels::RULE_ID, alert.rule_id.clone()),
                        KeyValue::new(labels::SEVERITY, alert.severity.as_str()),
                    ],
                );
                log_alert_transition(&alert.rule_id, alert.severity.as_str(), "fired", alert.value);
            }
            AlertTransition::Resolved(resolved) => {
                if let Some(entry) = history.iter_mut().rev().find(|entry| entry.id == resolved.id) {
                    *entry = resolved.clone();
                }
                log_alert_transition(&alert.rule_id, alert.severity.as_str(), "resolved", alert.value);
            }
        }
    }

    async fn notify_handlers(&self, alert: &AlertInstance, rule: &AlertRule) {
        let handlers: Vec<NamedHandler> = self.handlers.read().clone();
        if handlers.is_empty() {
            return;
        }
        let timeout = self.config.handler_timeout();

        let outcomes = join_all(handlers.iter().map(|(name, handler)| async move {
            let invocation = AssertUnwindSafe(handler.handle(alert, rule)).catch_unwind();
            let reason = match tokio::time::timeout(timeout, invocation).await {
                Ok(Ok(Ok(()))) => return None,
                Ok(Ok(Err(reason))) => reason,
                Ok(Err(panic)) => format!("panicked: {}", panic_message(panic.as_ref())),
                Err(_) => format!("timed out after {}ms", timeout.as_millis()),
            };
            Some(MonitoringError::AlertHandlerFailure {
                handler: name.clone(),
                reason,
            })
        }))
        .await;

        for failure in outcomes.into_iter().flatten() {
            let context = format!("alert_id={} rule_id={}", alert.id, alert.rule_id);
            log_error("monitoring", "notify_handlers", &failure.to_string(), Some(&context));
        }
    }

    /// Spawn the evaluation loop. It runs every evaluation interval until
    /// `shutdown` is cancelled.
    pub fn start_monitoring(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = self.config.evaluation_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(interval_seconds = interval.as_secs(), "Performance monitoring loop started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Performance monitoring loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let transitions = monitor.evaluate_alerts().await;
                        if !transitions.is_empty() {
                            debug!(transitions = transitions.len(), "Alert evaluation produced transitions");
                        }
                    }
                }
            }
        })
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
