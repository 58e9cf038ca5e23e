//! Recovery decision table and retry backoff.
//!
//! The category → strategy mapping lives in [`DECISION_TABLE`] as data, keyed by
//! category and attempt ordinal. Ordinals past the end of a row reuse the last
//! entry.

use crate::config::{BASE_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS};
use crate::{ErrorCategory, RecoveryStrategy};
use std::time::Duration;

use RecoveryStrategy::{DelayedRetry, DomReset, FallbackDisplay, ImmediateRetry, ScriptReload};

/// One row of the decision table
#[derive(Debug, Clone, Copy)]
pub struct DecisionRow {
    /// Category the row applies to
    pub category: ErrorCategory,
    /// Strategy by attempt ordinal (0 = first failure)
    pub by_attempt: &'static [RecoveryStrategy],
}

impl DecisionRow {
    /// Strategy for the given attempt ordinal
    pub fn strategy_for(&self, attempt: u32) -> RecoveryStrategy {
        let last = self.by_attempt.len().saturating_sub(1);
        self.by_attempt
            .get((attempt as usize).min(last))
            .copied()
            .unwrap_or(FallbackDisplay)
    }
}

/// Strategy decision table, the single source of truth for recovery choices.
pub const DECISION_TABLE: [DecisionRow; 7] = [
    DecisionRow {
        category: ErrorCategory::ScriptLoad,
        by_attempt: &[ScriptReload, DelayedRetry, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::Dom,
        by_attempt: &[DomReset, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::AdRender,
        by_attempt: &[ImmediateRetry, ImmediateRetry, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::Network,
        by_attempt: &[DelayedRetry, DelayedRetry, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::Timeout,
        by_attempt: &[DelayedRetry, DelayedRetry, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::Validation,
        by_attempt: &[DomReset, FallbackDisplay],
    },
    DecisionRow {
        category: ErrorCategory::Unknown,
        by_attempt: &[DelayedRetry, FallbackDisplay],
    },
];

/// Look up the table row for a category
pub fn decision_row(category: ErrorCategory) -> &'static DecisionRow {
    DECISION_TABLE
        .iter()
        .find(|row| row.category == category)
        // Every category has a row; Unknown is the catch-all
        .unwrap_or(&DECISION_TABLE[DECISION_TABLE.len() - 1])
}

/// Choose a strategy. Exhausted retries always fall back.
pub fn determine_recovery_strategy(
    category: ErrorCategory,
    retry_count: u32,
    max_retries: u32,
) -> RecoveryStrategy {
    if retry_count >= max_retries {
        return FallbackDisplay;
    }
    decision_row(category).strategy_for(retry_count)
}

/// Per-category backoff multiplier
pub fn backoff_multiplier(category: ErrorCategory) -> f64 {
    match category {
        ErrorCategory::Network => 1.5,
        ErrorCategory::ScriptLoad => 2.0,
        ErrorCategory::Timeout => 1.8,
        ErrorCategory::Dom => 0.5,
        ErrorCategory::AdRender => 1.0,
        ErrorCategory::Validation => 0.8,
        ErrorCategory::Unknown => 1.0,
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, before the category multiplier
    pub base: Duration,
    /// Cap applied after the multiplier
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl BackoffPolicy {
    /// `min(base × 2^retry_count × multiplier, max)`, at nanosecond precision
    /// so small bases keep growing. A zero base disables backoff.
    pub fn delay_for(&self, category: ErrorCategory, retry_count: u32) -> Duration {
        let base_ns = self.base.as_nanos() as f64;
        let max_ns = self.max.as_nanos() as f64;
        let exponent = 2f64.powi(retry_count.min(62) as i32);
        let delay_ns = (base_ns * exponent * backoff_multiplier(category)).min(max_ns);
        Duration::from_nanos(delay_ns.round() as u64)
    }
}

/// Calculate retry delay with the default policy
pub fn calculate_retry_delay(category: ErrorCategory, retry_count: u32) -> Duration {
    BackoffPolicy::default().delay_for(category, retry_count)
}
