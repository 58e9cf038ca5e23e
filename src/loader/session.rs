//! Load session data and pipeline errors

use super::host::{ContainerId, HostError};
use super::script::ScriptError;
use crate::config::duration_millis;
use crate::LoadingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a container cannot take an ad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerProblem {
    /// No container handle was given
    Null,
    /// Handle does not resolve to an element
    NotFound,
    /// Element is detached from the document
    Detached,
    /// Element measures zero in at least one dimension
    ZeroSize,
}

impl std::fmt::Display for ContainerProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep numbers and ids out: the classifier reads this text
        let s = match self {
            ContainerProblem::Null => "container is null",
            ContainerProblem::NotFound => "container is not in the page",
            ContainerProblem::Detached => "container is not attached to the page",
            ContainerProblem::ZeroSize => "container has zero size",
        };
        write!(f, "{s}")
    }
}

/// Load pipeline failures. The planner classifies them by their text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Container missing, detached or empty
    #[error("Invalid container element: {0}")]
    InvalidContainer(ContainerProblem),

    /// Network script did not load
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Script loaded but its runtime object never appeared
    #[error("Ad network runtime did not initialize after script load")]
    RuntimeUnavailable,

    /// Marker element could not be created
    #[error("Failed to create ad marker element: {0}")]
    Marker(#[source] HostError),

    /// Marker stayed empty through every render check
    #[error("Ad render verification failed: marker produced no visible content")]
    RenderVerification,

    /// Attempt lost the race against the load timeout
    #[error("Ad request timed out")]
    Timeout {
        /// Budget that was exceeded
        after: Duration,
    },

    /// Session was cleaned up mid-attempt
    #[error("Ad load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Whether this error is the timeout race firing
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoadError::Timeout { .. })
    }
}

/// Snapshot of one placement's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSession {
    /// Placement
    pub placement_id: String,
    /// Container of the current or last attempt
    pub container: Option<ContainerId>,
    /// Reserved width
    pub width: u32,
    /// Reserved height
    pub height: u32,
    /// Retry limit
    pub max_retries: u32,
    /// Per-attempt budget
    #[serde(with = "duration_millis")]
    pub load_timeout: Duration,
    /// State machine position
    pub current_state: LoadingState,
    /// Retries used
    pub retry_count: u32,
    /// Start of the first attempt
    pub load_start_time: Option<DateTime<Utc>>,
    /// When the session reached SUCCESS or FALLBACK
    pub load_end_time: Option<DateTime<Utc>>,
    /// Text of the most recent failure
    pub last_error: Option<String>,
    /// Whether `cleanup` ran
    pub destroyed: bool,
}
