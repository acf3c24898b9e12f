//! # System Constants
//!
//! Names and defaults shared across the cache, load balancer and monitor.

/// Analysis kinds commonly requested by consultants
pub mod analysis_types {
    pub const COST_ANALYSIS: &str = "cost_analysis";
    pub const ARCHITECTURE_REVIEW: &str = "architecture_review";
    pub const SECURITY_REVIEW: &str = "security_review";
    pub const PERFORMANCE_REVIEW: &str = "performance_review";
    pub const GENERAL_CONSULTATION: &str = "general_consultation";
}

/// Identifiers of the built-in alert rules
pub mod alert_rules {
    pub const HIGH_ERROR_RATE: &str = "high_error_rate";
    pub const HIGH_P95_LATENCY: &str = "high_p95_latency";
    pub const LOW_CACHE_HIT_RATE: &str = "low_cache_hit_rate";
    pub const SESSION_ASSIGNMENT_FAILURES: &str = "session_assignment_failures";

    /// Error rate (0.0-1.0) above which requests are considered unhealthy
    pub const ERROR_RATE_THRESHOLD: f64 = 0.05;
    /// p95 latency in milliseconds above which responses are considered slow
    pub const P95_LATENCY_THRESHOLD_MS: f64 = 2000.0;
    /// Cache hit rate (0.0-1.0) below which the cache is underperforming
    pub const CACHE_HIT_RATE_THRESHOLD: f64 = 0.70;
    /// Consecutive evaluations the hit rate must stay low before firing
    pub const CACHE_HIT_RATE_SUSTAIN: u32 = 3;
}

/// OpenTelemetry instrument names
pub mod metric_names {
    pub const METER_NAME: &str = "consult-core";

    pub const REQUESTS_TOTAL: &str = "consult.requests.total";
    pub const REQUEST_FAILURES_TOTAL: &str = "consult.requests.failures.total";
    pub const REQUEST_DURATION: &str = "consult.requests.duration";
    pub const CACHE_HITS_TOTAL: &str = "consult.cache.hits.total";
    pub const CACHE_MISSES_TOTAL: &str = "consult.cache.misses.total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "consult.cache.evictions.total";
    pub const SESSIONS_ACTIVE: &str = "consult.sessions.active";
    pub const ASSIGNMENT_FAILURES_TOTAL: &str = "consult.sessions.assignment_failures.total";
    pub const ALERTS_FIRED_TOTAL: &str = "consult.alerts.fired.total";
}

/// Label keys attached to metrics and alert payloads
pub mod labels {
    pub const ANALYSIS_TYPE: &str = "analysis_type";
    pub const OUTCOME: &str = "outcome";
    pub const RULE_ID: &str = "rule_id";
    pub const SEVERITY: &str = "severity";
}

pub mod system {
    pub const CONSULT_CORE_VERSION: &str = "0.1.0";

    /// Smoothing factor for per-consultant response-time averages
    pub const RESPONSE_TIME_EWMA_ALPHA: f64 = 0.3;

    /// Shortest period for the monitoring and cleanup loops
    pub const MIN_LOOP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
}
