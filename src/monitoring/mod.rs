//! # Performance Monitor & Alerting
//!
//! Threshold rules over the [`crate::metrics::MetricsAggregator`] snapshot.
//! A breaching rule fires once, notifies every registered [`AlertHandler`],
//! and resolves when its condition clears; a per-rule cooldown prevents
//! re-firing.

mod alerts;
mod errors;
mod handlers;
mod monitor;

pub use alerts::{
    default_rules, AlertInstance, AlertRule, AlertSeverity, AlertState, AlertTransition,
    Comparator, MetricSelector,
};
pub use errors::{MonitoringError, MonitoringResult};
pub use handlers::{AlertHandler, LoggingAlertHandler};
pub use monitor::PerformanceMonitor;
