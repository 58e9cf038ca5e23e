//! Session configuration and tunable constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of retries per placement before falling back.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wall-clock budget for one load attempt in milliseconds.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

/// Base delay for exponential retry backoff in milliseconds.
pub const BASE_RETRY_DELAY_MS: u64 = 1_000;

/// Upper bound for any retry delay in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Interval between checks for the ad-network runtime object after the script loads.
pub const RUNTIME_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of runtime checks before the script is considered broken (5 seconds total).
pub const RUNTIME_POLL_ATTEMPTS: u32 = 50;

/// Interval between render verification checks on the marker element.
pub const RENDER_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Number of render checks before the creative is considered missing (3 seconds total).
pub const RENDER_CHECK_ATTEMPTS: u32 = 15;

/// Ad-network script, fetched at most once per page.
pub const AD_SCRIPT_URL: &str = "//t1.daumcdn.net/kas/static/ba.min.js";

/// Class name the ad-network script scans for.
pub const MARKER_CLASS: &str = "kakao_ad_area";

/// Name of the global object the network script installs once it has executed.
pub const RUNTIME_GLOBAL: &str = "adfit";

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Placement identifier missing
    #[error("placement id must not be empty")]
    EmptyPlacementId,

    /// Reserved slot size missing
    #[error("ad size must be non-zero, got {width}x{height}")]
    ZeroSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Timeout would fire before anything could load
    #[error("load timeout must be non-zero")]
    ZeroTimeout,
}

/// Configuration for one placement's load session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Network-assigned placement identifier (e.g. "DAN-abc123")
    pub placement_id: String,
    /// Retries allowed before the session falls back
    pub max_retries: u32,
    /// Budget for one attempt
    #[serde(with = "duration_millis")]
    pub load_timeout: Duration,
    /// Reserved creative width in CSS pixels
    pub width: u32,
    /// Reserved creative height in CSS pixels
    pub height: u32,
    /// Emit verbose debug events for this session
    pub debug: bool,
    /// Drive retries from `load_ad` (true) or park in ERROR/TIMEOUT and wait
    /// for an explicit `retry` call (false)
    pub auto_retry: bool,
}

impl SessionConfig {
    /// Create a validated configuration with default retry and timeout settings.
    pub fn new(
        placement_id: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            placement_id: placement_id.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
            width,
            height,
            debug: false,
            auto_retry: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Enable or disable debug events
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable automatic retries
    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Validate configuration integrity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.placement_id.trim().is_empty() {
            return Err(ConfigError::EmptyPlacementId);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.load_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Serialize a [`Duration`] as integer milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
