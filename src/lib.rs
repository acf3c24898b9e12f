#![allow(clippy::doc_markdown)] // Allow technical terms like OpenTelemetry, SHA-256 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Consult Core Rust
//!
//! Performance layer for AI-assisted consultation chat.
//!
//! ## Overview
//!
//! Every chat turn that needs an AI analysis goes through the
//! [`optimizer::PerformanceOptimizer`], which answers from the
//! [`cache::AnalysisCache`] when a near-duplicate request has been seen and
//! calls the upstream [`optimizer::AiProvider`] otherwise. Sessions are bound
//! to consultants by the [`load_balancer::SessionLoadBalancer`]. The
//! [`monitoring::PerformanceMonitor`] evaluates threshold rules over the
//! [`metrics::MetricsAggregator`] on its own schedule.
//!
//! ## Key Features
//!
//! - **Quality-Weighted Cache**: eviction by quality, recency and frequency
//! - **Pluggable Assignment**: least-loaded, round-robin or response-time weighted
//! - **Threshold Alerting**: cooldown, sustain counts and isolated handlers
//! - **OpenTelemetry Instruments**: every recorded value is mirrored to the global meter
//!
//! ## Module Organization
//!
//! - [`cache`] - Analysis cache, fingerprinting and eviction scoring
//! - [`optimizer`] - Cache-first request path and the upstream provider seam
//! - [`load_balancer`] - Consultant registry and session assignment
//! - [`monitoring`] - Alert rules, handlers and the evaluation loop
//! - [`metrics`] - Aggregated counters, latency window and reports
//! - [`config`] - Configuration presets and layered loading
//! - [`error`] - Structured error handling
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use consult_core::cache::AnalysisCache;
//! use consult_core::config::ConsultConfig;
//! use consult_core::metrics::MetricsAggregator;
//! use consult_core::optimizer::{OptimizationRequest, PerformanceOptimizer};
//! use consult_core::test_utils::MockAiProvider;
//!
//! # tokio_test::block_on(async {
//! let config = ConsultConfig::for_test();
//! let cache = Arc::new(AnalysisCache::new(config.cache.clone()));
//! let metrics = Arc::new(MetricsAggregator::new(config.monitoring.latency_window_size));
//! let optimizer = PerformanceOptimizer::new(
//!     cache,
//!     Arc::new(MockAiProvider::new("mock")),
//!     metrics,
//!     config.optimizer.clone(),
//! );
//!
//! let request = OptimizationRequest::new("session-1", "cost_analysis", "How do we cut cost?");
//! let first = optimizer.optimize(request.clone()).await.unwrap();
//! let second = optimizer.optimize(request).await.unwrap();
//! assert!(!first.cache_hit && second.cache_hit);
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod load_balancer;
pub mod logging;
pub mod metrics;
pub mod monitoring;
pub mod optimizer;
pub mod test_utils;

pub use cache::{AnalysisCache, CacheEntry, CacheStatistics};
pub use config::{ConfigManager, ConsultConfig};
pub use error::{ConsultError, ConsultResult};
pub use load_balancer::{AssignmentStrategy, SessionLoadBalancer};
pub use metrics::{MetricsAggregator, PerformanceReport};
pub use monitoring::{AlertHandler, AlertRule, PerformanceMonitor};
pub use optimizer::{AiProvider, OptimizationRequest, OptimizationResult, PerformanceOptimizer};
