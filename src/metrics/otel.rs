//! # OpenTelemetry Instruments
//!
//! Mirrors aggregator activity into OpenTelemetry instruments on the global
//! meter. Nothing is exported unless the embedding process installs a meter
//! provider; otherwise every call is a no-op.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::OnceLock;

use crate::constants::metric_names;

static CONSULT_METER: OnceLock<Meter> = OnceLock::new();
static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

fn meter() -> &'static Meter {
    CONSULT_METER.get_or_init(|| opentelemetry::global::meter(metric_names::METER_NAME))
}

/// Instruments shared by every aggregator in the process
pub struct Instruments {
    pub requests_total: Counter<u64>,
    pub request_failures_total: Counter<u64>,
    /// Labels: outcome (success, failure)
    pub request_duration: Histogram<f64>,
    pub cache_hits_total: Counter<u64>,
    pub cache_misses_total: Counter<u64>,
    pub cache_evictions_total: Counter<u64>,
    pub sessions_active: Gauge<u64>,
    pub assignment_failures_total: Counter<u64>,
    /// Labels: rule_id, severity
    pub alerts_fired_total: Counter<u64>,
}

/// Get or lazily build the process-wide instruments
pub fn instruments() -> &'static Instruments {
    INSTRUMENTS.get_or_init(|| {
        let meter = meter();
        Instruments {
            requests_total: meter
                .u64_counter(metric_names::REQUESTS_TOTAL)
                .with_description("Total AI analysis requests handled")
                .build(),
            request_failures_total: meter
                .u64_counter(metric_names::REQUEST_FAILURES_TOTAL)
                .with_description("AI analysis requests that failed upstream")
                .build(),
            request_duration: meter
                .f64_histogram(metric_names::REQUEST_DURATION)
                .with_description("AI analysis request duration in milliseconds")
                .with_unit("ms")
                .build(),
            cache_hits_total: meter
                .u64_counter(metric_names::CACHE_HITS_TOTAL)
                .with_description("Analysis cache hits")
                .build(),
            cache_misses_total: meter
                .u64_counter(metric_names::CACHE_MISSES_TOTAL)
                .with_description("Analysis cache misses")
                .build(),
            cache_evictions_total: meter
                .u64_counter(metric_names::CACHE_EVICTIONS_TOTAL)
                .with_description("Analysis cache evictions")
                .build(),
            sessions_active: meter
                .u64_gauge(metric_names::SESSIONS_ACTIVE)
                .with_description("Chat sessions currently assigned to a consultant")
                .build(),
            assignment_failures_total: meter
                .u64_counter(metric_names::ASSIGNMENT_FAILURES_TOTAL)
                .with_description("Session assignments rejected for lack of capacity")
                .build(),
            alerts_fired_total: meter
                .u64_counter(metric_names::ALERTS_FIRED_TOTAL)
                .with_description("Alert firing transitions")
                .build(),
        }
    })
}
