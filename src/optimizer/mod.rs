//! # Performance Optimizer
//!
//! Cache-first wrapper around the upstream AI provider. A hit returns the
//! cached analysis immediately; a miss calls [`AiProvider::generate`], scores
//! the answer with [`estimate_quality`] and caches it when it is reusable.

mod errors;
mod provider;
mod quality;
mod service;
mod types;

pub use errors::{OptimizerError, OptimizerResult};
pub use provider::{AiProvider, AiResponse, ProviderError};
pub use quality::estimate_quality;
pub use service::PerformanceOptimizer;
pub use types::{OptimizationRequest, OptimizationResult, OptimizerStats, RequestPriority};
