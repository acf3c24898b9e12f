//! # Consultant Session Load Balancer
//!
//! Binds each chat session to one consultant for its lifetime. Selection is
//! delegated to a hot-swappable [`AssignmentStrategy`]; idle assignments are
//! released by [`SessionLoadBalancer::cleanup_expired_sessions`], driven on an
//! interval by [`SessionLoadBalancer::run_cleanup_loop`].

mod balancer;
mod errors;
mod state;
mod strategy;

pub use balancer::{LoadBalancerMetrics, SessionLoadBalancer};
pub use errors::{LoadBalancerError, LoadBalancerResult};
pub use state::{ConsultantLoadState, SessionAssignment};
pub use strategy::AssignmentStrategy;
