//! Table command: print the recovery decision table

use super::{print_json, CliError, OutputFormat};
use crate::recovery::{backoff_multiplier, BackoffPolicy, DECISION_TABLE};
use crate::{ErrorCategory, RecoveryStrategy};
use clap::Args;
use serde::Serialize;

/// Table arguments
#[derive(Debug, Clone, Args)]
pub struct TableArgs {
    /// Retry ordinals to show delays for
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub ordinals: u32,
}

/// One category's row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    /// Category
    pub category: ErrorCategory,
    /// Strategy by attempt ordinal
    pub strategies: Vec<RecoveryStrategy>,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Default-policy delay in milliseconds by retry ordinal
    pub delays_ms: Vec<u64>,
}

impl TableArgs {
    /// Rows in category priority order
    pub fn rows(&self) -> Vec<TableRow> {
        let policy = BackoffPolicy::default();
        DECISION_TABLE
            .iter()
            .map(|row| TableRow {
                category: row.category,
                strategies: (0..self.ordinals).map(|n| row.strategy_for(n)).collect(),
                multiplier: backoff_multiplier(row.category),
                delays_ms: (0..self.ordinals)
                    .map(|n| policy.delay_for(row.category, n).as_millis() as u64)
                    .collect(),
            })
            .collect()
    }

    /// Print the table
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let rows = self.rows();
        match format {
            OutputFormat::Json => print_json(&rows)?,
            OutputFormat::Human => {
                for row in &rows {
                    let strategies: Vec<_> = row.strategies.iter().map(|s| s.as_str()).collect();
                    let delays: Vec<_> = row.delays_ms.iter().map(|d| format!("{d}ms")).collect();
                    println!(
                        "{:<20} x{:<4} {}  [{}]",
                        row.category.as_str(),
                        row.multiplier,
                        strategies.join(" -> "),
                        delays.join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}
