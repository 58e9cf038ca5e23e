//! # Ad Slot Resilience Library
//!
//! Loads third-party advertisement creatives into content pages without ever
//! destabilising the host page. Ad delivery is asynchronous and unreliable (ad
//! blockers, slow networks, absent or malformed responses); this crate decides
//! whether to retry, how long to wait, which recovery actions to run and when to
//! give up and show a static fallback.
//!
//! ## Features
//!
//! - **Per-placement state machine**: `IDLE → LOADING → SUCCESS | ERROR | TIMEOUT → FALLBACK`
//! - **Pure error classification**: keyword-driven categories, severities and a
//!   data-driven recovery decision table
//! - **Structured event log**: bounded ring buffer with running load metrics,
//!   JSON/CSV export and an optional persisted debug trail
//! - **Performance monitor**: per-attempt timing and memory capture, leak
//!   detection, threshold-triggered cleanup and recommendation reports
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use adslot_resilience::config::SessionConfig;
//! use adslot_resilience::loader::{AdLoadingManager, ContainerId, InMemoryPage, ScriptLoader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let page = Arc::new(InMemoryPage::new());
//! let container = ContainerId::new("ad-top");
//! page.add_container(container.clone(), 320, 100);
//!
//! let scripts = Arc::new(ScriptLoader::new(page.clone()));
//! let config = SessionConfig::new("DAN-abc123", 320, 100)?;
//! let manager = AdLoadingManager::new(config, page, scripts)?;
//!
//! let loaded = manager.load_ad(Some(container)).await;
//! println!("loaded: {loaded}, state: {}", manager.state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`logging`] - Append-only structured event record plus aggregate metrics
//! - [`recovery`] - Error classifier and recovery planner (pure functions + stats)
//! - [`monitor`] - Performance and leak monitor
//! - [`loader`] - Loading manager, script loader service and host abstraction
//! - [`cancel`] - Cancellable waits on the session's cancellation token
//! - [`config`] - Session configuration and tunable constants
//! - [`metrics`] - Prometheus-compatible metric emission

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Cancellable waits
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Session configuration and tunables
pub mod config;

/// Loading manager and page host abstraction
pub mod loader;

/// Structured event logging and aggregate metrics
pub mod logging;

/// Metric emission through the `metrics` facade
pub mod metrics;

/// Performance and memory leak monitoring
pub mod monitor;

/// Error classification and recovery planning
pub mod recovery;

// Re-export commonly used types
pub use loader::AdLoadingManager;
pub use logging::AdLogger;
pub use monitor::PerformanceMonitor;
pub use recovery::RecoveryPlanner;

/// Life-cycle state of one placement's load session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadingState {
    /// Created, nothing requested yet
    #[serde(rename = "IDLE")]
    Idle,
    /// Load pipeline in flight
    #[serde(rename = "LOADING")]
    Loading,
    /// Creative rendered (terminal)
    #[serde(rename = "SUCCESS")]
    Success,
    /// Attempt failed
    #[serde(rename = "ERROR")]
    Error,
    /// Attempt lost the race against the load timeout
    #[serde(rename = "TIMEOUT")]
    Timeout,
    /// Static placeholder shown instead of an ad (terminal)
    #[serde(rename = "FALLBACK")]
    Fallback,
}

impl LoadingState {
    /// Whether no further transition may leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingState::Success | LoadingState::Fallback)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: LoadingState) -> bool {
        use LoadingState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Success)
                | (Loading, Error)
                | (Loading, Timeout)
                | (Error, Loading)
                | (Error, Fallback)
                | (Timeout, Loading)
                | (Timeout, Fallback)
        )
    }
}

impl std::fmt::Display for LoadingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadingState::Idle => "IDLE",
            LoadingState::Loading => "LOADING",
            LoadingState::Success => "SUCCESS",
            LoadingState::Error => "ERROR",
            LoadingState::Timeout => "TIMEOUT",
            LoadingState::Fallback => "FALLBACK",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LoadingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(LoadingState::Idle),
            "LOADING" => Ok(LoadingState::Loading),
            "SUCCESS" => Ok(LoadingState::Success),
            "ERROR" => Ok(LoadingState::Error),
            "TIMEOUT" => Ok(LoadingState::Timeout),
            "FALLBACK" => Ok(LoadingState::Fallback),
            _ => Err(format!("Invalid loading state: {s}")),
        }
    }
}

/// Category assigned to a failed attempt by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Ad-network script could not be fetched or executed
    #[serde(rename = "SCRIPT_LOAD_ERROR")]
    ScriptLoad,
    /// Network-level failure (blocked, CORS, connection)
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// Attempt exceeded its time budget
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    /// Container or marker element problem
    #[serde(rename = "DOM_ERROR")]
    Dom,
    /// Script loaded but the creative never became visible
    #[serde(rename = "AD_RENDER_ERROR")]
    AdRender,
    /// Input or response failed validation
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Nothing recognisable in the error text
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorCategory {
    /// All categories in classifier priority order
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::ScriptLoad,
        ErrorCategory::Timeout,
        ErrorCategory::Network,
        ErrorCategory::Dom,
        ErrorCategory::AdRender,
        ErrorCategory::Validation,
        ErrorCategory::Unknown,
    ];

    /// Wire name (e.g. `SCRIPT_LOAD_ERROR`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ScriptLoad => "SCRIPT_LOAD_ERROR",
            ErrorCategory::Network => "NETWORK_ERROR",
            ErrorCategory::Timeout => "TIMEOUT_ERROR",
            ErrorCategory::Dom => "DOM_ERROR",
            ErrorCategory::AdRender => "AD_RENDER_ERROR",
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Invalid error category: {s}"))
    }
}

/// Coarse ranking deciding whether retrying is worthwhile at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Transient, retry freely
    #[serde(rename = "LOW")]
    Low,
    /// Retry with backoff
    #[serde(rename = "MEDIUM")]
    Medium,
    /// Retry at most once more
    #[serde(rename = "HIGH")]
    High,
    /// Stop retrying
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::High => "HIGH",
            ErrorSeverity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ErrorSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(ErrorSeverity::Low),
            "MEDIUM" => Ok(ErrorSeverity::Medium),
            "HIGH" => Ok(ErrorSeverity::High),
            "CRITICAL" => Ok(ErrorSeverity::Critical),
            _ => Err(format!("Invalid error severity: {s}")),
        }
    }
}

/// Recovery strategy chosen for one classified error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    /// Retry straight away
    #[serde(rename = "IMMEDIATE_RETRY")]
    ImmediateRetry,
    /// Retry after the computed backoff
    #[serde(rename = "DELAYED_RETRY")]
    DelayedRetry,
    /// Drop the network script and fetch it again
    #[serde(rename = "SCRIPT_RELOAD")]
    ScriptReload,
    /// Clear the container and recreate the marker
    #[serde(rename = "DOM_RESET")]
    DomReset,
    /// Give up and show the static placeholder
    #[serde(rename = "FALLBACK_DISPLAY")]
    FallbackDisplay,
    /// Nothing to do
    #[serde(rename = "NO_RECOVERY")]
    NoRecovery,
}

impl RecoveryStrategy {
    /// Wire name (e.g. `SCRIPT_RELOAD`)
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::ImmediateRetry => "IMMEDIATE_RETRY",
            RecoveryStrategy::DelayedRetry => "DELAYED_RETRY",
            RecoveryStrategy::ScriptReload => "SCRIPT_RELOAD",
            RecoveryStrategy::DomReset => "DOM_RESET",
            RecoveryStrategy::FallbackDisplay => "FALLBACK_DISPLAY",
            RecoveryStrategy::NoRecovery => "NO_RECOVERY",
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATE_RETRY" => Ok(RecoveryStrategy::ImmediateRetry),
            "DELAYED_RETRY" => Ok(RecoveryStrategy::DelayedRetry),
            "SCRIPT_RELOAD" => Ok(RecoveryStrategy::ScriptReload),
            "DOM_RESET" => Ok(RecoveryStrategy::DomReset),
            "FALLBACK_DISPLAY" => Ok(RecoveryStrategy::FallbackDisplay),
            "NO_RECOVERY" => Ok(RecoveryStrategy::NoRecovery),
            _ => Err(format!("Invalid recovery strategy: {s}")),
        }
    }
}
