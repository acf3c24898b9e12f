//! Bounded window of recent request outcomes and latencies.
//!
//! Feeds the rolling error rate and the latency percentiles; lifetime totals
//! live in the aggregator's counters.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RequestSample {
    latency: Duration,
    success: bool,
}

/// Ring buffer of the most recent requests
///
/// Recording holds the lock only long enough to push one sample; percentile
/// computation copies the window out before sorting.
#[derive(Debug)]
pub struct RequestWindow {
    samples: Mutex<VecDeque<RequestSample>>,
    capacity: usize,
}

/// Outcome and latency statistics over the window, latencies in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStatistics {
    pub samples: usize,
    pub failures: usize,
    /// Failures / samples, 0.0 for an empty window
    pub error_rate: f64,
    pub average_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl RequestWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, latency: Duration, success: bool) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(RequestSample { latency, success });
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Compute statistics over the current window. An empty window yields zeros.
    pub fn statistics(&self) -> WindowStatistics {
        let (mut times, failures): (Vec<f64>, usize) = {
            let samples = self.samples.lock();
            let times = samples
                .iter()
                .map(|s| s.latency.as_secs_f64() * 1000.0)
                .collect();
            (times, samples.iter().filter(|s| !s.success).count())
        };

        if times.is_empty() {
            return WindowStatistics::default();
        }

        times.sort_by(|a, b| a.total_cmp(b));

        let average_ms = times.iter().sum::<f64>() / times.len() as f64;

        WindowStatistics {
            samples: times.len(),
            failures,
            error_rate: failures as f64 / times.len() as f64,
            average_ms,
            p50_ms: nearest_rank(&times, 0.50),
            p95_ms: nearest_rank(&times, 0.95),
            p99_ms: nearest_rank(&times, 0.99),
            max_ms: times[times.len() - 1],
        }
    }
}

/// Nearest-rank percentile over sorted, non-empty input
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}
