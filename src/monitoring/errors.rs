//! Monitoring error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitoringError {
    /// An alert handler returned an error, timed out or panicked. Logged,
    /// never propagated out of evaluation.
    #[error("Alert handler '{handler}' failed: {reason}")]
    AlertHandlerFailure { handler: String, reason: String },

    /// No evaluated snapshot exists yet
    #[error("Performance snapshot unavailable: {reason}")]
    SnapshotUnavailable { reason: String },
}

pub type MonitoringResult<T> = Result<T, MonitoringError>;
