//! Proptest strategies for cache and session workloads

use proptest::prelude::*;

/// One cache operation in a generated workload
#[derive(Debug, Clone)]
pub enum CacheOp {
    Store {
        analysis_type: String,
        content: String,
        quality: f64,
    },
    Lookup {
        analysis_type: String,
        content: String,
    },
}

pub fn analysis_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("cost_analysis".to_string()),
        Just("architecture_review".to_string()),
        Just("security_review".to_string()),
    ]
}

/// Small content alphabet so lookups and refreshes hit existing keys
pub fn content_strategy() -> impl Strategy<Value = String> {
    (0u8..24).prop_map(|n| format!("question {n}"))
}

pub fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (analysis_type_strategy(), content_strategy(), -0.5f64..1.5).prop_map(
            |(analysis_type, content, quality)| CacheOp::Store {
                analysis_type,
                content,
                quality,
            }
        ),
        (analysis_type_strategy(), content_strategy())
            .prop_map(|(analysis_type, content)| CacheOp::Lookup {
                analysis_type,
                content,
            }),
    ]
}

/// One session operation in a generated workload
#[derive(Debug, Clone)]
pub enum SessionOp {
    Assign { session: u8, preferred: Option<u8> },
    Release { session: u8 },
    SetAvailability { consultant: u8, available: bool },
}

pub fn session_op_strategy() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        4 => (0u8..16, proptest::option::of(0u8..4))
            .prop_map(|(session, preferred)| SessionOp::Assign { session, preferred }),
        3 => (0u8..16).prop_map(|session| SessionOp::Release { session }),
        1 => (0u8..4, any::<bool>())
            .prop_map(|(consultant, available)| SessionOp::SetAvailability { consultant, available }),
    ]
}
