//! Error types for the consultation performance core.
//!
//! Each component owns a focused error enum; [`ConsultError`] unifies them for
//! callers that drive more than one component.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::load_balancer::LoadBalancerError;
use crate::monitoring::MonitoringError;
use crate::optimizer::OptimizerError;

#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),
    #[error("Load balancer error: {0}")]
    LoadBalancer(#[from] LoadBalancerError),
    #[error("Monitoring error: {0}")]
    Monitoring(#[from] MonitoringError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl ConsultError {
    /// Whether the condition should be surfaced to the end user rather than
    /// absorbed as added latency.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ConsultError::LoadBalancer(LoadBalancerError::NoAvailableConsultant { .. })
                | ConsultError::Optimizer(_)
        )
    }
}

pub type ConsultResult<T> = std::result::Result<T, ConsultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_consultant_is_user_visible() {
        let err: ConsultError = LoadBalancerError::NoAvailableConsultant {
            session_id: "s-1".to_string(),
        }
        .into();
        assert!(err.is_user_visible());
        assert!(err.to_string().contains("s-1"));
    }

    #[test]
    fn test_release_of_unknown_session_is_not_user_visible() {
        let err: ConsultError = LoadBalancerError::SessionNotAssigned {
            session_id: "s-2".to_string(),
        }
        .into();
        assert!(!err.is_user_visible());
    }
}
