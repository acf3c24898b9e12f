//! # Metrics Aggregator
//!
//! Accumulates the counters, gauges and latency samples published by the
//! optimizer, cache and load balancer, and folds them into a pull-style
//! [`PerformanceReport`].
//!
//! ## Concurrency
//!
//! Every recording method is safe under arbitrary concurrent callers:
//! - request outcomes use lock-free atomic counters
//! - recent outcomes and latencies go into a bounded ring buffer with a
//!   brief internal lock
//! - gauge snapshots are swapped atomically (`crossbeam::atomic::AtomicCell`)
//! - per-consultant and custom series live in `DashMap`s
//!
//! Sources that have not reported yet appear as `None` sections in the
//! report rather than failing it.

pub mod otel;
pub mod window;

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::{labels, system::RESPONSE_TIME_EWMA_ALPHA};

pub use window::{RequestWindow, WindowStatistics};

/// A single named observation folded into a rolling summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Latest cache gauges pushed by `record_cache_metrics`
#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheGauges {
    hits: u64,
    misses: u64,
    size: usize,
    evictions: u64,
    average_entry_age: Duration,
}

/// Latest host gauges pushed by `record_system_metrics`
#[derive(Debug, Clone, Copy, PartialEq)]
struct SystemGauges {
    cpu_percent: f64,
    memory_percent: f64,
    active_workers: usize,
    memory_bytes: u64,
    gc_pause: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RollingSummary {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

/// Request outcome and latency summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Failed / total over the rolling window, 0.0 when it is empty
    pub error_rate: f64,
    /// Failed / total since startup
    pub lifetime_error_rate: f64,
    pub window_samples: usize,
    pub average_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub evictions: u64,
    pub average_entry_age_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub active_workers: usize,
    pub memory_bytes: u64,
    pub gc_pause_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub active_sessions: u64,
    pub assignment_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetricSummary {
    pub count: u64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

/// Point-in-time snapshot of everything the aggregator has seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub requests: RequestSummary,
    /// `None` until the cache has reported
    pub cache: Option<CacheSummary>,
    /// `None` until host metrics have been reported
    pub system: Option<SystemSummary>,
    pub sessions: SessionSummary,
    pub custom: BTreeMap<String, CustomMetricSummary>,
}

/// Process-wide sink for performance telemetry
#[derive(Debug)]
pub struct MetricsAggregator {
    started_at: Instant,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    assignment_failures: AtomicU64,
    active_sessions: AtomicU64,
    window: RequestWindow,
    cache: AtomicCell<Option<CacheGauges>>,
    system: AtomicCell<Option<SystemGauges>>,
    /// Smoothed upstream response time per consultant, in milliseconds
    consultant_response_ms: DashMap<String, f64>,
    custom: DashMap<String, RollingSummary>,
}

impl MetricsAggregator {
    pub fn new(latency_window_size: usize) -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            assignment_failures: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            window: RequestWindow::new(latency_window_size),
            cache: AtomicCell::new(None),
            system: AtomicCell::new(None),
            consultant_response_ms: DashMap::new(),
            custom: DashMap::new(),
        }
    }

    /// Record the outcome and duration of one AI request
    pub fn record_request(&self, success: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let outcome = if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            "failure"
        };
        self.window.record(duration, success);

        let instruments = otel::instruments();
        instruments.requests_total.add(1, &[]);
        if !success {
            instruments.request_failures_total.add(1, &[]);
        }
        instruments.request_duration.record(
            duration.as_secs_f64() * 1000.0,
            &[KeyValue::new(labels::OUTCOME, outcome)],
        );
    }

    /// Replace the cache gauges with the latest cumulative values
    pub fn record_cache_metrics(
        &self,
        hits: u64,
        misses: u64,
        size: usize,
        evictions: u64,
        average_entry_age: Duration,
    ) {
        self.cache.store(Some(CacheGauges {
            hits,
            misses,
            size,
            evictions,
            average_entry_age,
        }));
    }

    /// Replace the host gauges with the latest values
    pub fn record_system_metrics(
        &self,
        cpu_percent: f64,
        memory_percent: f64,
        active_workers: usize,
        memory_bytes: u64,
        gc_pause: Duration,
    ) {
        self.system.store(Some(SystemGauges {
            cpu_percent,
            memory_percent,
            active_workers,
            memory_bytes,
            gc_pause,
        }));
    }

    pub fn record_assignment_failure(&self) {
        self.assignment_failures.fetch_add(1, Ordering::Relaxed);
        otel::instruments().assignment_failures_total.add(1, &[]);
    }

    pub fn record_active_sessions(&self, active: u64) {
        self.active_sessions.store(active, Ordering::Relaxed);
        otel::instruments().sessions_active.record(active, &[]);
    }

    /// Fold an upstream round trip into the consultant's smoothed response time
    pub fn record_consultant_response_time(&self, consultant_id: &str, duration: Duration) {
        let observed_ms = duration.as_secs_f64() * 1000.0;
        self.consultant_response_ms
            .entry(consultant_id.to_string())
            .and_modify(|avg| {
                *avg = RESPONSE_TIME_EWMA_ALPHA * observed_ms
                    + (1.0 - RESPONSE_TIME_EWMA_ALPHA) * *avg
            })
            .or_insert(observed_ms);
    }

    /// Smoothed response time per consultant that has reported at least once
    pub fn consultant_response_times(&self) -> HashMap<String, Duration> {
        self.consultant_response_ms
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    Duration::from_secs_f64(entry.value().max(0.0) / 1000.0),
                )
            })
            .collect()
    }

    /// Fold an arbitrary named sample into its rolling summary
    pub fn record_sample(&self, sample: MetricSample) {
        let value = sample.value;
        self.custom
            .entry(sample.name)
            .and_modify(|summary| {
                summary.count += 1;
                summary.sum += value;
                summary.min = summary.min.min(value);
                summary.max = summary.max.max(value);
                summary.last = value;
            })
            .or_insert(RollingSummary {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            });
    }

    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Cache hit rate from the latest cache gauges, if any were reported
    pub fn cache_hit_rate(&self) -> Option<f64> {
        self.cache.load().map(|gauges| hit_rate(gauges.hits, gauges.misses))
    }

    /// Build a snapshot of all recorded metrics
    pub fn report(&self) -> PerformanceReport {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful_requests = self.successful_requests.load(Ordering::Relaxed);
        let failed_requests = self.failed_requests.load(Ordering::Relaxed);
        let window = self.window.statistics();

        let lifetime_error_rate = if total_requests > 0 {
            failed_requests as f64 / total_requests as f64
        } else {
            0.0
        };

        let cache = self.cache.load().map(|gauges| CacheSummary {
            hits: gauges.hits,
            misses: gauges.misses,
            hit_rate: hit_rate(gauges.hits, gauges.misses),
            size: gauges.size,
            evictions: gauges.evictions,
            average_entry_age_ms: gauges.average_entry_age.as_secs_f64() * 1000.0,
        });

        let system = self.system.load().map(|gauges| SystemSummary {
            cpu_percent: gauges.cpu_percent,
            memory_percent: gauges.memory_percent,
            active_workers: gauges.active_workers,
            memory_bytes: gauges.memory_bytes,
            gc_pause_ms: gauges.gc_pause.as_secs_f64() * 1000.0,
        });

        let custom = self
            .custom
            .iter()
            .map(|entry| {
                let summary = entry.value();
                (
                    entry.key().clone(),
                    CustomMetricSummary {
                        count: summary.count,
                        average: summary.sum / summary.count.max(1) as f64,
                        min: summary.min,
                        max: summary.max,
                        last: summary.last,
                    },
                )
            })
            .collect();

        PerformanceReport {
            generated_at: Utc::now(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            requests: RequestSummary {
                total_requests,
                successful_requests,
                failed_requests,
                error_rate: window.error_rate,
                lifetime_error_rate,
                window_samples: window.samples,
                average_latency_ms: window.average_ms,
                p50_latency_ms: window.p50_ms,
                p95_latency_ms: window.p95_ms,
                p99_latency_ms: window.p99_ms,
                max_latency_ms: window.max_ms,
            },
            cache,
            system,
            sessions: SessionSummary {
                active_sessions: self.active_sessions.load(Ordering::Relaxed),
                assignment_failures: self.assignment_failures.load(Ordering::Relaxed),
            },
            custom,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
