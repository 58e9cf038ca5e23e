//! Recovery planner: composes classification, severity, strategy and backoff
//! into one decision and keeps process-lifetime error statistics.

use super::classifier::{assess_error_severity, categorize_error, ErrorRecord};
use super::plan::{ErrorDecision, RecoveryPlan};
use super::table::{determine_recovery_strategy, BackoffPolicy};
use crate::config::{duration_millis, BASE_RETRY_DELAY_MS, DEFAULT_MAX_RETRIES, MAX_RETRY_DELAY_MS};
use crate::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error};

/// Signature of a classifier function
pub type Classifier = fn(Option<&ErrorRecord>) -> ErrorCategory;

/// Planner tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    /// Base backoff delay
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Retries used when the caller supplies no context
    pub max_retries: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl PlannerConfig {
    /// Set the base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the backoff cap
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the default retry limit
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Backoff policy derived from this config
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.base_delay,
            max: self.max_delay,
        }
    }
}

/// Caller context for one error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Placement the error belongs to
    pub placement_id: Option<String>,
    /// Retry limit for this session; `None` uses the planner default
    pub max_retries: Option<u32>,
}

impl ErrorContext {
    /// Context for a placement with its own retry limit
    pub fn for_placement(placement_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            placement_id: Some(placement_id.into()),
            max_retries: Some(max_retries),
        }
    }
}

/// Whether another attempt is worthwhile.
pub fn should_retry(
    retry_count: u32,
    max_retries: u32,
    category: ErrorCategory,
    severity: ErrorSeverity,
) -> bool {
    if retry_count >= max_retries {
        return false;
    }
    if severity == ErrorSeverity::Critical {
        return false;
    }
    // DOM problems get one reset, never a second
    if category == ErrorCategory::Dom && retry_count >= 1 {
        return false;
    }
    true
}

/// Attempts and successes for one strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Retries run with this strategy
    pub attempts: u64,
    /// Retries that ended in SUCCESS
    pub successes: u64,
}

impl RecoveryOutcome {
    /// Success share as a percentage string, `"0%"` when nothing was attempted
    pub fn percentage(&self) -> String {
        if self.attempts == 0 {
            return "0%".to_string();
        }
        format!(
            "{:.2}%",
            self.successes as f64 / self.attempts as f64 * 100.0
        )
    }
}

/// Outcome counts plus the derived percentage, as exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRate {
    /// Retries run with this strategy
    pub attempts: u64,
    /// Retries that ended in SUCCESS
    pub successes: u64,
    /// `successes / attempts` as a percentage
    pub percentage: String,
}

impl From<RecoveryOutcome> for RecoveryRate {
    fn from(outcome: RecoveryOutcome) -> Self {
        Self {
            attempts: outcome.attempts,
            successes: outcome.successes,
            percentage: outcome.percentage(),
        }
    }
}

/// Process-lifetime error statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Errors handled since the last reset
    pub total_errors: u64,
    /// Count per category
    pub errors_by_type: BTreeMap<ErrorCategory, u64>,
    /// Count per chosen strategy
    pub errors_by_strategy: BTreeMap<RecoveryStrategy, u64>,
    /// Reported outcomes per strategy
    pub recovery_success_rate: BTreeMap<RecoveryStrategy, RecoveryRate>,
}

#[derive(Debug, Default)]
struct StatsState {
    total_errors: u64,
    errors_by_type: BTreeMap<ErrorCategory, u64>,
    errors_by_strategy: BTreeMap<RecoveryStrategy, u64>,
    outcomes: BTreeMap<RecoveryStrategy, RecoveryOutcome>,
}

/// Maps errors to recovery decisions. Safe to share between sessions.
#[derive(Debug)]
pub struct RecoveryPlanner {
    config: PlannerConfig,
    classifier: Classifier,
    stats: Mutex<StatsState>,
}

impl Default for RecoveryPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl RecoveryPlanner {
    /// Create a planner using the keyword classifier
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            classifier: categorize_error,
            stats: Mutex::new(StatsState::default()),
        }
    }

    /// Replace the classifier
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Planner configuration
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Classify `error` and decide what to do about it.
    ///
    /// Never panics: a failure inside classification yields
    /// [`ErrorDecision::emergency`].
    pub fn handle_error(
        &self,
        error: Option<&ErrorRecord>,
        retry_count: u32,
        context: &ErrorContext,
    ) -> ErrorDecision {
        let max_retries = context.max_retries.unwrap_or(self.config.max_retries);

        let decision = match catch_unwind(AssertUnwindSafe(|| {
            self.decide(error, retry_count, max_retries)
        })) {
            Ok(decision) => decision,
            Err(_) => {
                error!(
                    placement_id = context.placement_id.as_deref().unwrap_or("-"),
                    retry_count, "Error classification panicked, using emergency fallback"
                );
                ErrorDecision::emergency()
            }
        };

        self.record(&decision);
        debug!(
            placement_id = context.placement_id.as_deref().unwrap_or("-"),
            retry_count,
            error_type = %decision.error_type,
            severity = %decision.severity,
            strategy = %decision.strategy,
            delay_ms = decision.retry_delay.as_millis() as u64,
            "Error classified"
        );
        decision
    }

    fn decide(
        &self,
        error: Option<&ErrorRecord>,
        retry_count: u32,
        max_retries: u32,
    ) -> ErrorDecision {
        let error_type = (self.classifier)(error);
        let severity = assess_error_severity(error_type, retry_count, max_retries);
        let strategy = determine_recovery_strategy(error_type, retry_count, max_retries);
        let recovery_plan =
            RecoveryPlan::for_strategy(strategy, error_type, retry_count, &self.config.backoff());
        let should_retry = should_retry(retry_count, max_retries, error_type, severity);
        let retry_delay = recovery_plan.delay;

        ErrorDecision {
            error_type,
            severity,
            strategy,
            recovery_plan,
            should_retry,
            retry_delay,
            fallback_required: strategy == RecoveryStrategy::FallbackDisplay || !should_retry,
        }
    }

    fn record(&self, decision: &ErrorDecision) {
        let mut stats = self.stats.lock();
        stats.total_errors += 1;
        *stats.errors_by_type.entry(decision.error_type).or_insert(0) += 1;
        *stats
            .errors_by_strategy
            .entry(decision.strategy)
            .or_insert(0) += 1;
    }

    /// Report how an attempt started by `strategy` ended.
    pub fn update_recovery_stats(&self, strategy: RecoveryStrategy, success: bool) {
        let mut stats = self.stats.lock();
        let outcome = stats.outcomes.entry(strategy).or_default();
        outcome.attempts += 1;
        if success {
            outcome.successes += 1;
        }
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> ErrorStats {
        let stats = self.stats.lock();
        ErrorStats {
            total_errors: stats.total_errors,
            errors_by_type: stats.errors_by_type.clone(),
            errors_by_strategy: stats.errors_by_strategy.clone(),
            recovery_success_rate: stats
                .outcomes
                .iter()
                .map(|(strategy, outcome)| (*strategy, RecoveryRate::from(*outcome)))
                .collect(),
        }
    }

    /// Clear all statistics
    pub fn reset_stats(&self) {
        *self.stats.lock() = StatsState::default();
    }
}
