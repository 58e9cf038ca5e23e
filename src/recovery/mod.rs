//! Error classification and recovery planning.
//!
//! Everything here is pure apart from the planner's statistics: the same
//! error text, retry count and limit always produce the same decision.

pub mod classifier;
pub mod plan;
pub mod planner;
pub mod table;

pub use classifier::{assess_error_severity, categorize_error, ErrorRecord, KEYWORD_GROUPS};
pub use plan::{ErrorDecision, RecoveryAction, RecoveryPlan};
pub use planner::{
    should_retry, ErrorContext, ErrorStats, PlannerConfig, RecoveryOutcome, RecoveryPlanner,
    RecoveryRate,
};
pub use table::{
    backoff_multiplier, calculate_retry_delay, determine_recovery_strategy, BackoffPolicy,
    DecisionRow, DECISION_TABLE,
};
