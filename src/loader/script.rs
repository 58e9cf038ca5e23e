//! Page-wide ad network script loader
//!
//! One [`ScriptLoader`] is shared by every manager on a page. The load result
//! is memoized behind an async mutex, so concurrent managers inject the script
//! at most once; a failed load is not memoized and the next caller retries.

use super::host::{HostError, PageHost, ScriptTag};
use crate::config::AD_SCRIPT_URL;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Script acquisition failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// Error event from the script tag; the host's text is kept verbatim
    #[error("{0}")]
    LoadFailed(String),
}

impl From<HostError> for ScriptError {
    fn from(error: HostError) -> Self {
        match error {
            HostError::ScriptFailed(message) => ScriptError::LoadFailed(message),
            other => ScriptError::LoadFailed(format!("Script load failed: {other}")),
        }
    }
}

/// How `ensure_loaded` was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStatus {
    /// Memoized from an earlier load
    Cached,
    /// A tag was already in the document
    AlreadyPresent,
    /// This call injected the tag
    Injected,
}

/// Memoized loader for the network script
pub struct ScriptLoader {
    host: Arc<dyn PageHost>,
    src: String,
    loaded: Mutex<bool>,
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader").field("src", &self.src).finish()
    }
}

impl ScriptLoader {
    /// Loader for the default network script
    pub fn new(host: Arc<dyn PageHost>) -> Self {
        Self::with_src(host, AD_SCRIPT_URL)
    }

    /// Loader for a custom script source
    pub fn with_src(host: Arc<dyn PageHost>, src: impl Into<String>) -> Self {
        Self {
            host,
            src: src.into(),
            loaded: Mutex::new(false),
        }
    }

    /// Script source
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Make sure the script is loaded, injecting it if needed.
    ///
    /// Callers racing on the same loader wait for the first one's result.
    pub async fn ensure_loaded(&self) -> Result<ScriptStatus, ScriptError> {
        let mut loaded = self.loaded.lock().await;
        if *loaded {
            return Ok(ScriptStatus::Cached);
        }

        if self.host.has_script(&self.src) {
            debug!(src = %self.src, "Ad script tag already present");
            *loaded = true;
            return Ok(ScriptStatus::AlreadyPresent);
        }

        let tag = ScriptTag::new(self.src.clone());
        match self.host.inject_script(&tag).await {
            Ok(()) => {
                *loaded = true;
                info!(src = %self.src, "Ad script loaded");
                Ok(ScriptStatus::Injected)
            }
            Err(e) => {
                // Drop the half-loaded tag so the next attempt injects again
                self.host.remove_script(&self.src);
                warn!(src = %self.src, error = %e, "Ad script failed to load");
                Err(e.into())
            }
        }
    }

    /// Whether a successful load is memoized
    pub async fn is_loaded(&self) -> bool {
        *self.loaded.lock().await
    }

    /// Forget the memoized load and remove the script tag.
    pub async fn reset(&self) {
        let mut loaded = self.loaded.lock().await;
        *loaded = false;
        self.host.remove_script(&self.src);
        debug!(src = %self.src, "Ad script reset");
    }
}
