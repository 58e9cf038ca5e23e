//! Classify command: show the planner's decision at every retry ordinal

use super::{print_json, CliError, OutputFormat};
use crate::config::{BASE_RETRY_DELAY_MS, DEFAULT_MAX_RETRIES, MAX_RETRY_DELAY_MS};
use crate::recovery::{ErrorContext, ErrorDecision, ErrorRecord, PlannerConfig, RecoveryPlanner};
use clap::Args;
use serde::Serialize;
use std::time::Duration;

/// Classify arguments
#[derive(Debug, Clone, Args)]
pub struct ClassifyArgs {
    /// Error message to classify
    pub message: String,

    /// Optional stack trace, searched together with the message
    #[arg(long)]
    pub stack: Option<String>,

    /// Retry limit to plan against
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Base retry delay in milliseconds
    #[arg(
        long,
        default_value_t = BASE_RETRY_DELAY_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub base_delay_ms: u64,

    /// Retry delay cap in milliseconds
    #[arg(long, default_value_t = MAX_RETRY_DELAY_MS)]
    pub max_delay_ms: u64,
}

/// Decision at one retry ordinal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedAttempt {
    /// Retries already used
    pub retry_count: u32,
    /// Planner output
    pub decision: ErrorDecision,
}

impl ClassifyArgs {
    /// Decisions for retry counts `0..=max_retries`
    pub fn decisions(&self) -> Result<Vec<ClassifiedAttempt>, CliError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(CliError::InvalidArgument(format!(
                "max delay {}ms is below base delay {}ms",
                self.max_delay_ms, self.base_delay_ms
            )));
        }

        let planner = RecoveryPlanner::new(
            PlannerConfig::default()
                .with_base_delay(Duration::from_millis(self.base_delay_ms))
                .with_max_delay(Duration::from_millis(self.max_delay_ms))
                .with_max_retries(self.max_retries),
        );
        let record = match &self.stack {
            Some(stack) => ErrorRecord::new(self.message.clone()).with_stack(stack.clone()),
            None => ErrorRecord::new(self.message.clone()),
        };
        let context = ErrorContext {
            placement_id: None,
            max_retries: Some(self.max_retries),
        };

        Ok((0..=self.max_retries)
            .map(|retry_count| ClassifiedAttempt {
                retry_count,
                decision: planner.handle_error(Some(&record), retry_count, &context),
            })
            .collect())
    }

    /// Print the decisions
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let attempts = self.decisions()?;
        match format {
            OutputFormat::Json => print_json(&attempts)?,
            OutputFormat::Human => {
                if let Some(first) = attempts.first() {
                    println!("category: {}", first.decision.error_type);
                }
                println!(
                    "{:>5}  {:<8} {:<16} {:>8}  RETRY",
                    "ORD", "SEVERITY", "STRATEGY", "DELAY"
                );
                for attempt in &attempts {
                    let decision = &attempt.decision;
                    println!(
                        "{:>5}  {:<8} {:<16} {:>6}ms  {}",
                        attempt.retry_count,
                        decision.severity,
                        decision.strategy,
                        decision.retry_delay.as_millis(),
                        if decision.should_retry { "yes" } else { "no" }
                    );
                }
            }
        }
        Ok(())
    }
}
