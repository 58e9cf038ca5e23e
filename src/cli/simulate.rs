//! Simulate command: drive placements against an in-memory page

use super::{print_json, CliError, OutputFormat};
use crate::config::{SessionConfig, DEFAULT_LOAD_TIMEOUT_MS, DEFAULT_MAX_RETRIES};
use crate::loader::{
    AdLoadingManager, ContainerId, InMemoryPage, LoadSession, RenderBehavior, ScriptLoader,
    ScriptOutcome,
};
use crate::logging::{AdLogger, FileStore, LoggerConfig, LogLevel, MetricsSnapshot};
use crate::monitor::{MonitorConfig, PerformanceMonitor, PerformanceReport, ProcessMemoryProbe};
use crate::recovery::{ErrorStats, PlannerConfig, RecoveryPlanner};
use clap::Args;
use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How creatives behave once their marker exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RenderMode {
    /// Render as soon as the marker is inserted
    Immediate,
    /// Render after `--render-delay-ms`
    Delayed,
    /// Never render
    Never,
}

/// Simulate arguments
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of placements sharing the page
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub placements: u32,

    /// Placement id prefix; placements are numbered from 1
    #[arg(long, default_value = "DAN-sim")]
    pub placement_prefix: String,

    /// Slot width in pixels
    #[arg(long, default_value = "320")]
    pub width: u32,

    /// Slot height in pixels
    #[arg(long, default_value = "100")]
    pub height: u32,

    /// Retries per placement
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Per-attempt timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_LOAD_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Base retry delay in milliseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub base_delay_ms: u64,

    /// Number of script injections that fail before one succeeds
    #[arg(long, default_value = "0")]
    pub script_failures: u32,

    /// Error text reported by failing script injections
    #[arg(long, default_value = "Script load failed")]
    pub script_error: String,

    /// Script injections never settle (forces timeouts)
    #[arg(long, default_value_t = false)]
    pub script_hang: bool,

    /// Creative render behaviour
    #[arg(long, default_value = "immediate")]
    pub render: RenderMode,

    /// Render delay for `--render delayed`
    #[arg(long, default_value = "500")]
    pub render_delay_ms: u64,

    /// The runtime global never appears after script load
    #[arg(long, default_value_t = false)]
    pub no_runtime: bool,

    /// Containers are detached from the page
    #[arg(long, default_value_t = false)]
    pub detached: bool,

    /// Minimum level kept in the event log
    #[arg(long, default_value = "INFO")]
    pub log_level: LogLevel,

    /// Write the event log as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Write the event log as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Directory for the persisted debug trail
    #[arg(long)]
    pub persist_dir: Option<PathBuf>,
}

/// Outcome of one simulation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    /// Final session snapshots, in placement order
    pub sessions: Vec<LoadSession>,
    /// Event logger metrics
    pub metrics: MetricsSnapshot,
    /// Planner statistics
    pub error_stats: ErrorStats,
    /// Monitor report
    pub report: PerformanceReport,
}

impl SimulateArgs {
    fn build_page(&self) -> InMemoryPage {
        let render = match self.render {
            RenderMode::Immediate => RenderBehavior::Immediate,
            RenderMode::Delayed => RenderBehavior::After(Duration::from_millis(self.render_delay_ms)),
            RenderMode::Never => RenderBehavior::Never,
        };
        let default_outcome = if self.script_hang {
            ScriptOutcome::Hang
        } else {
            ScriptOutcome::Load
        };
        let runtime_delay = if self.no_runtime {
            None
        } else {
            Some(Duration::ZERO)
        };

        let page = InMemoryPage::new()
            .with_default_script_outcome(default_outcome)
            .with_render_behavior(render)
            .with_runtime_delay(runtime_delay);
        for _ in 0..self.script_failures {
            page.push_script_outcome(ScriptOutcome::Fail(self.script_error.clone()));
        }
        page
    }

    fn build_logger(&self) -> AdLogger {
        let persist = self.persist_dir.is_some();
        let logger = AdLogger::new(
            LoggerConfig::default()
                .with_min_level(self.log_level)
                .with_console(true)
                .with_persist(persist),
        );
        match &self.persist_dir {
            Some(dir) => logger.with_store(Arc::new(FileStore::new(dir.clone()))),
            None => logger,
        }
    }

    /// Run the simulation and print its summary.
    pub async fn execute(
        &self,
        format: OutputFormat,
        shutdown: CancellationToken,
    ) -> Result<SimulationSummary, CliError> {
        let summary = self.run(shutdown).await?;
        match format {
            OutputFormat::Json => print_json(&summary)?,
            OutputFormat::Human => print_human(&summary),
        }
        Ok(summary)
    }

    /// Run the simulation without printing.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<SimulationSummary, CliError> {
        let page = Arc::new(self.build_page());
        let scripts = Arc::new(ScriptLoader::new(page.clone()));
        let logger = Arc::new(self.build_logger());
        let planner = Arc::new(RecoveryPlanner::new(
            PlannerConfig::default()
                .with_base_delay(Duration::from_millis(self.base_delay_ms))
                .with_max_retries(self.max_retries),
        ));
        let monitor = Arc::new(PerformanceMonitor::with_probe(
            MonitorConfig::default(),
            Arc::new(ProcessMemoryProbe),
        ));
        let mut placements = Vec::with_capacity(self.placements as usize);
        for n in 1..=self.placements {
            let placement_id = format!("{}-{n}", self.placement_prefix);
            let container = ContainerId::new(format!("slot-{n}"));
            page.add_container(container.clone(), self.width, self.height);
            if self.detached {
                page.detach_container(&container);
            }

            let config = SessionConfig::new(placement_id, self.width, self.height)?
                .with_max_retries(self.max_retries)
                .with_load_timeout(Duration::from_millis(self.timeout_ms));
            let manager = AdLoadingManager::new(config, page.clone(), scripts.clone())?
                .with_logger(logger.clone())
                .with_planner(planner.clone())
                .with_monitor(monitor.clone());
            placements.push((Arc::new(manager), container));
        }

        let sampler = monitor.clone().spawn_sampler(shutdown.clone());
        info!(placements = placements.len(), "Starting simulation");

        let loads = join_all(placements.iter().map(|(manager, container)| {
            let manager = manager.clone();
            let container = container.clone();
            async move { manager.load_ad(Some(container)).await }
        }));
        let interrupted = tokio::select! {
            _ = loads => false,
            _ = shutdown.cancelled() => true,
        };
        if interrupted {
            warn!("Simulation interrupted, cleaning up sessions");
            for (manager, _) in &placements {
                manager.cleanup();
            }
        }

        let sessions = placements.iter().map(|(manager, _)| manager.session()).collect();
        let summary = SimulationSummary {
            sessions,
            metrics: logger.metrics(),
            error_stats: planner.stats(),
            report: monitor.generate_performance_report(),
        };

        if let Some(path) = &self.export_json {
            write_file(path, &logger.export_json()?)?;
            info!(path = %path.display(), "Exported event log as JSON");
        }
        if let Some(path) = &self.export_csv {
            write_file(path, &logger.export_csv()?)?;
            info!(path = %path.display(), "Exported event log as CSV");
        }

        for (manager, _) in &placements {
            manager.cleanup();
        }
        shutdown.cancel();
        let _ = sampler.await;

        Ok(summary)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| CliError::IoError(format!("Failed to write {}: {e}", path.display())))
}

fn print_human(summary: &SimulationSummary) {
    println!("{:<20} {:<10} {:>7}  LAST ERROR", "PLACEMENT", "STATE", "RETRIES");
    for session in &summary.sessions {
        println!(
            "{:<20} {:<10} {:>7}  {}",
            session.placement_id,
            session.current_state,
            session.retry_count,
            session.last_error.as_deref().unwrap_or("-")
        );
    }

    let metrics = &summary.metrics;
    println!();
    println!(
        "attempts: {}  successes: {}  errors: {}  retries: {}",
        metrics.total_attempts, metrics.success_count, metrics.error_count, metrics.retry_count
    );
    println!(
        "success rate: {}  error rate: {}  average load time: {:.1}ms",
        metrics.success_rate, metrics.error_rate, metrics.average_load_time
    );
    for (category, count) in &metrics.errors_by_category {
        println!("  {category}: {count}");
    }

    if !summary.error_stats.recovery_success_rate.is_empty() {
        println!();
        println!("recovery success:");
        for (strategy, rate) in &summary.error_stats.recovery_success_rate {
            println!(
                "  {strategy}: {} ({}/{})",
                rate.percentage, rate.successes, rate.attempts
            );
        }
    }

    if !summary.report.recommendations.is_empty() {
        println!();
        println!("recommendations:");
        for recommendation in &summary.report.recommendations {
            println!("  - {}", recommendation.message);
        }
    }
}
