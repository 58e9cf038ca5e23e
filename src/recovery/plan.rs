//! Recovery plans and planner decisions

use super::table::BackoffPolicy;
use crate::config::duration_millis;
use crate::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One step of a recovery plan, executed in order by the loading manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryAction {
    /// Remove the current marker element from the container
    RemoveMarker,
    /// Empty the container so the next attempt starts clean
    ClearContainer,
    /// Forget the memoized script load and drop the script tag
    ResetScript,
    /// Wait for the plan's delay
    WaitBackoff,
    /// Start the next attempt
    RetryLoad,
    /// Replace the slot with the static placeholder
    ShowFallback,
    /// Record the final failure
    LogFailure,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryAction::RemoveMarker => "REMOVE_MARKER",
            RecoveryAction::ClearContainer => "CLEAR_CONTAINER",
            RecoveryAction::ResetScript => "RESET_SCRIPT",
            RecoveryAction::WaitBackoff => "WAIT_BACKOFF",
            RecoveryAction::RetryLoad => "RETRY_LOAD",
            RecoveryAction::ShowFallback => "SHOW_FALLBACK",
            RecoveryAction::LogFailure => "LOG_FAILURE",
        };
        write!(f, "{s}")
    }
}

/// Strategy, delay and ordered actions chosen for one classified error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    /// Strategy the plan implements
    pub strategy: RecoveryStrategy,
    /// Wait before the next attempt
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Actions to run, in order
    pub actions: Vec<RecoveryAction>,
    /// Human-readable summary
    pub description: String,
}

impl RecoveryPlan {
    /// Build the plan for `strategy`. Delayed strategies use the backoff for
    /// `(category, retry_count)`.
    pub fn for_strategy(
        strategy: RecoveryStrategy,
        category: ErrorCategory,
        retry_count: u32,
        backoff: &BackoffPolicy,
    ) -> Self {
        use RecoveryAction::*;

        let backoff_delay = || backoff.delay_for(category, retry_count);
        let (delay, actions, description) = match strategy {
            RecoveryStrategy::ImmediateRetry => {
                (Duration::ZERO, vec![RetryLoad], "Retry immediately")
            }
            RecoveryStrategy::DelayedRetry => (
                backoff_delay(),
                vec![WaitBackoff, RetryLoad],
                "Retry after exponential backoff",
            ),
            RecoveryStrategy::ScriptReload => (
                backoff_delay(),
                vec![ResetScript, WaitBackoff, RetryLoad],
                "Reload the ad network script and retry",
            ),
            RecoveryStrategy::DomReset => (
                backoff_delay(),
                vec![RemoveMarker, ClearContainer, WaitBackoff, RetryLoad],
                "Reset the container and recreate the marker",
            ),
            RecoveryStrategy::FallbackDisplay => (
                Duration::ZERO,
                vec![RemoveMarker, ShowFallback, LogFailure],
                "Show the static fallback",
            ),
            RecoveryStrategy::NoRecovery => (Duration::ZERO, Vec::new(), "No recovery"),
        };

        Self {
            strategy,
            delay,
            actions,
            description: description.to_string(),
        }
    }

    /// Plan used when classification itself failed
    pub fn emergency() -> Self {
        Self {
            strategy: RecoveryStrategy::FallbackDisplay,
            delay: Duration::ZERO,
            actions: vec![
                RecoveryAction::RemoveMarker,
                RecoveryAction::ShowFallback,
                RecoveryAction::LogFailure,
            ],
            description: "Emergency fallback after classifier failure".to_string(),
        }
    }

    /// Whether the plan leads to another attempt
    pub fn retries(&self) -> bool {
        self.actions.contains(&RecoveryAction::RetryLoad)
    }
}

/// Everything the planner decided about one error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDecision {
    /// Classified category
    pub error_type: ErrorCategory,
    /// Assessed severity
    pub severity: ErrorSeverity,
    /// Chosen strategy
    pub strategy: RecoveryStrategy,
    /// Plan to execute
    pub recovery_plan: RecoveryPlan,
    /// Whether another attempt is allowed
    pub should_retry: bool,
    /// Delay before that attempt
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    /// Whether the session must end in FALLBACK
    pub fallback_required: bool,
}

impl ErrorDecision {
    /// Safe default when classification panicked.
    pub fn emergency() -> Self {
        Self {
            error_type: ErrorCategory::Unknown,
            severity: ErrorSeverity::Critical,
            strategy: RecoveryStrategy::FallbackDisplay,
            recovery_plan: RecoveryPlan::emergency(),
            should_retry: false,
            retry_delay: Duration::ZERO,
            fallback_required: true,
        }
    }
}
