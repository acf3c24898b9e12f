//! Alert rules, instances and the metric selectors rules evaluate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{ConfigResult, ConfigurationError};
use crate::constants::alert_rules;
use crate::metrics::PerformanceReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSelector {
    ErrorRate,
    P50LatencyMs,
    P95LatencyMs,
    P99LatencyMs,
    CacheHitRate,
    /// Assignment failures since the previous evaluation
    AssignmentFailures,
    CpuPercent,
    MemoryPercent,
}

impl MetricSelector {
    /// Read the selected value, or `None` when its source has not reported
    pub fn observe(&self, report: &PerformanceReport, new_assignment_failures: u64) -> Option<f64> {
        let requests = &report.requests;
        match self {
            MetricSelector::ErrorRate => (requests.window_samples > 0).then_some(requests.error_rate),
            MetricSelector::P50LatencyMs => (requests.window_samples > 0).then_some(requests.p50_latency_ms),
            MetricSelector::P95LatencyMs => (requests.window_samples > 0).then_some(requests.p95_latency_ms),
            MetricSelector::P99LatencyMs => (requests.window_samples > 0).then_some(requests.p99_latency_ms),
            MetricSelector::CacheHitRate => report
                .cache
                .as_ref()
                .filter(|cache| cache.hits + cache.misses > 0)
                .map(|cache| cache.hit_rate),
            MetricSelector::AssignmentFailures => Some(new_assignment_failures as f64),
            MetricSelector::CpuPercent => report.system.as_ref().map(|system| system.cpu_percent),
            MetricSelector::MemoryPercent => report.system.as_ref().map(|system| system.memory_percent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Comparator {
    pub fn breached(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::GreaterThanOrEqual => value >= threshold,
            Comparator::LessThan => value < threshold,
            Comparator::LessThanOrEqual => value <= threshold,
        }
    }
}

fn default_sustain() -> u32 {
    1
}

/// Threshold rule evaluated on every monitoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub metric: MetricSelector,
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: AlertSeverity,
    /// Minimum time between two firings of this rule
    pub cooldown_seconds: u64,
    /// Consecutive breaching evaluations required before firing
    #[serde(default = "default_sustain")]
    pub sustain: u32,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        metric: MetricSelector,
        comparator: Comparator,
        threshold: f64,
        severity: AlertSeverity,
        cooldown: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            metric,
            comparator,
            threshold,
            severity,
            cooldown_seconds: cooldown.as_secs(),
            sustain: 1,
        }
    }

    pub fn with_sustain(mut self, sustain: u32) -> Self {
        self.sustain = sustain;
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "monitoring.rules[].id",
                "alert rule",
            ));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigurationError::invalid_value(
                format!("monitoring.rules[{}].threshold", self.id),
                self.threshold,
                "threshold must be finite",
            ));
        }
        if self.sustain == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("monitoring.rules[{}].sustain", self.id),
                0,
                "sustain must be at least 1",
            ));
        }
        Ok(())
    }
}

/// The built-in rule set
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            alert_rules::HIGH_ERROR_RATE,
            MetricSelector::ErrorRate,
            Comparator::GreaterThan,
            alert_rules::ERROR_RATE_THRESHOLD,
            AlertSeverity::Critical,
            Duration::from_secs(300),
        ),
        AlertRule::new(
            alert_rules::HIGH_P95_LATENCY,
            MetricSelector::P95LatencyMs,
            Comparator::GreaterThan,
            alert_rules::P95_LATENCY_THRESHOLD_MS,
            AlertSeverity::Warning,
            Duration::from_secs(300),
        ),
        AlertRule::new(
            alert_rules::LOW_CACHE_HIT_RATE,
            MetricSelector::CacheHitRate,
            Comparator::LessThan,
            alert_rules::CACHE_HIT_RATE_THRESHOLD,
            AlertSeverity::Warning,
            Duration::from_secs(600),
        )
        .with_sustain(alert_rules::CACHE_HIT_RATE_SUSTAIN),
        AlertRule::new(
            alert_rules::SESSION_ASSIGNMENT_FAILURES,
            MetricSelector::AssignmentFailures,
            Comparator::GreaterThan,
            0.0,
            AlertSeverity::Critical,
            Duration::from_secs(300),
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Firing,
    Resolved,
}

/// One firing of a rule, from breach until resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: Uuid,
    pub rule_id: String,
    pub severity: AlertSeverity,
    pub state: AlertState,
    /// Observed value when the alert fired
    pub value: f64,
    pub threshold: f64,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertInstance {
    pub(crate) fn fire(rule: &AlertRule, value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id.clone(),
            severity: rule.severity,
            state: AlertState::Firing,
            value,
            threshold: rule.threshold,
            fired_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub(crate) fn resolve(&mut self) {
        self.state = AlertState::Resolved;
        self.resolved_at = Some(Utc::now());
    }

    pub fn is_firing(&self) -> bool {
        self.state == AlertState::Firing
    }
}

/// A state change produced by one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transition", content = "alert", rename_all = "snake_case")]
pub enum AlertTransition {
    Fired(AlertInstance),
    Resolved(AlertInstance),
}

impl AlertTransition {
    pub fn alert(&self) -> &AlertInstance {
        match self {
            AlertTransition::Fired(alert) | AlertTransition::Resolved(alert) => alert,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, AlertTransition::Fired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsAggregator;

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 4);
        for rule in &rules {
            rule.validate().unwrap();
        }
        let hit_rate = rules
            .iter()
            .find(|r| r.id == alert_rules::LOW_CACHE_HIT_RATE)
            .unwrap();
        assert_eq!(hit_rate.sustain, 3);
        assert_eq!(hit_rate.cooldown(), Duration::from_secs(600));
    }

    #[test]
    fn test_selectors_without_data() {
        let report = MetricsAggregator::new(10).report();
        assert_eq!(MetricSelector::ErrorRate.observe(&report, 0), None);
        assert_eq!(MetricSelector::P95LatencyMs.observe(&report, 0), None);
        assert_eq!(MetricSelector::CacheHitRate.observe(&report, 0), None);
        assert_eq!(MetricSelector::CpuPercent.observe(&report, 0), None);
        assert_eq!(MetricSelector::AssignmentFailures.observe(&report, 2), Some(2.0));
    }

    #[test]
    fn test_selectors_with_data() {
        let metrics = MetricsAggregator::new(10);
        metrics.record_request(false, Duration::from_millis(100));
        metrics.record_request(true, Duration::from_millis(300));
        metrics.record_cache_metrics(3, 1, 4, 0, Duration::ZERO);
        metrics.record_system_metrics(55.0, 40.0, 4, 1024, Duration::ZERO);
        let report = metrics.report();

        assert_eq!(MetricSelector::ErrorRate.observe(&report, 0), Some(0.5));
        assert_eq!(MetricSelector::CacheHitRate.observe(&report, 0), Some(0.75));
        assert_eq!(MetricSelector::CpuPercent.observe(&report, 0), Some(55.0));
        assert_eq!(MetricSelector::MemoryPercent.observe(&report, 0), Some(40.0));
        assert!(MetricSelector::P99LatencyMs.observe(&report, 0).unwrap() >= 300.0);
    }

    #[test]
    fn test_comparators() {
        assert!(Comparator::GreaterThan.breached(0.06, 0.05));
        assert!(!Comparator::GreaterThan.breached(0.05, 0.05));
        assert!(Comparator::GreaterThanOrEqual.breached(0.05, 0.05));
        assert!(Comparator::LessThan.breached(0.5, 0.7));
        assert!(Comparator::LessThanOrEqual.breached(0.7, 0.7));
    }

    #[test]
    fn test_rule_validation() {
        let rule = AlertRule::new(
            "",
            MetricSelector::ErrorRate,
            Comparator::GreaterThan,
            0.1,
            AlertSeverity::Info,
            Duration::ZERO,
        );
        assert!(rule.validate().is_err());

        let rule = AlertRule {
            id: "x".to_string(),
            ..rule
        }
        .with_sustain(0);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_deserializes_with_default_sustain() {
        let rule: AlertRule = serde_json::from_str(
            r#"{"id":"cpu","metric":"cpu_percent","comparator":"greater_than",
                "threshold":90.0,"severity":"warning","cooldown_seconds":60}"#,
        )
        .unwrap();
        assert_eq!(rule.sustain, 1);
        assert_eq!(rule.metric, MetricSelector::CpuPercent);
    }
}
