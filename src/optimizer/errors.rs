//! Optimizer error types

use thiserror::Error;

/// Errors surfaced by [`crate::optimizer::PerformanceOptimizer::optimize`]
///
/// A cache miss is not an error; both variants describe the upstream AI call
/// failing after the cache could not answer.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The upstream provider returned an error
    #[error("Upstream AI provider '{provider}' failed: {message}")]
    UpstreamAIFailure { provider: String, message: String },

    /// The upstream call exceeded the configured request timeout
    #[error("Upstream AI provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

impl OptimizerError {
    pub fn provider(&self) -> &str {
        match self {
            OptimizerError::UpstreamAIFailure { provider, .. }
            | OptimizerError::Timeout { provider, .. } => provider,
        }
    }

    /// Whether a later retry of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, OptimizerError::Timeout { .. })
    }
}

pub type OptimizerResult<T> = Result<T, OptimizerError>;
