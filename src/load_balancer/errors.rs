//! Load balancer error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadBalancerError {
    #[error("Session {session_id} has no active assignment")]
    SessionNotAssigned { session_id: String },

    #[error("No consultant available for session {session_id}: pool is empty, saturated or offline")]
    NoAvailableConsultant { session_id: String },

    #[error("Unknown consultant: {consultant_id}")]
    UnknownConsultant { consultant_id: String },

    #[error("Consultant already registered: {consultant_id}")]
    ConsultantAlreadyRegistered { consultant_id: String },

    #[error("Consultant {consultant_id} still has {active_sessions} active sessions")]
    ConsultantHasActiveSessions {
        consultant_id: String,
        active_sessions: usize,
    },

    #[error("Invalid capacity {capacity} for consultant {consultant_id}")]
    InvalidCapacity { consultant_id: String, capacity: usize },
}

pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;
