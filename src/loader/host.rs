//! Page host abstraction
//!
//! The loading manager never touches a document directly. Everything it needs
//! from the page (container geometry, the marker element, the network script
//! tag, the network runtime, placeholders) goes through [`PageHost`].

use crate::config::{AD_SCRIPT_URL, MARKER_CLASS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Host-side failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Container handle does not resolve to an element
    #[error("container {0} not found")]
    ContainerNotFound(String),

    /// Marker element could not be created or attached
    #[error("marker insertion failed: {0}")]
    MarkerInsertion(String),

    /// Script tag reported an error event
    #[error("{0}")]
    ScriptFailed(String),
}

/// Handle to one container element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Handle for the element with `id`
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Element id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Live geometry of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStatus {
    /// Whether the element is attached to the document
    pub attached: bool,
    /// Measured width in CSS pixels
    pub width: u32,
    /// Measured height in CSS pixels
    pub height: u32,
}

/// `<ins class="kakao_ad_area" data-ad-unit=… data-ad-width=… data-ad-height=…>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdMarker {
    /// Always [`MARKER_CLASS`]
    pub class: String,
    /// `data-ad-unit`
    pub ad_unit: String,
    /// `data-ad-width`
    pub width: u32,
    /// `data-ad-height`
    pub height: u32,
}

impl AdMarker {
    /// Marker for a placement
    pub fn new(placement_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            class: MARKER_CLASS.to_string(),
            ad_unit: placement_id.into(),
            width,
            height,
        }
    }

    /// HTML the network script scans for
    pub fn to_html(&self) -> String {
        format!(
            r#"<ins class="{}" data-ad-unit="{}" data-ad-width="{}" data-ad-height="{}"></ins>"#,
            self.class,
            html_escape(&self.ad_unit),
            self.width,
            self.height
        )
    }
}

/// `<script async defer src=…>` appended once to the document head
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptTag {
    /// Script source
    pub src: String,
    /// `async` attribute
    pub is_async: bool,
    /// `defer` attribute
    pub defer: bool,
}

impl ScriptTag {
    /// Async, deferred tag for `src`
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            is_async: true,
            defer: true,
        }
    }

    /// HTML of the tag
    pub fn to_html(&self) -> String {
        let mut attrs = String::new();
        if self.is_async {
            attrs.push_str(" async");
        }
        if self.defer {
            attrs.push_str(" defer");
        }
        format!(r#"<script{attrs} src="{}"></script>"#, html_escape(&self.src))
    }
}

impl Default for ScriptTag {
    fn default() -> Self {
        Self::new(AD_SCRIPT_URL)
    }
}

/// What the marker looks like after the network script ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderEvidence {
    /// Child nodes inside the marker
    pub child_nodes: u32,
    /// Length of the marker's trimmed text content
    pub text_len: u32,
    /// Measured box width
    pub box_width: u32,
    /// Measured box height
    pub box_height: u32,
}

impl RenderEvidence {
    /// Evidence of a rendered iframe creative
    pub fn rendered(width: u32, height: u32) -> Self {
        Self {
            child_nodes: 1,
            text_len: 0,
            box_width: width,
            box_height: height,
        }
    }

    /// Whether anything visible was produced
    pub fn is_rendered(&self) -> bool {
        self.child_nodes > 0 || self.text_len > 0 || (self.box_width > 0 && self.box_height > 0)
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Page operations used by the loading manager.
#[async_trait]
pub trait PageHost: Send + Sync {
    /// Geometry of `container`, `None` if it does not exist
    fn container_status(&self, container: &ContainerId) -> Option<ContainerStatus>;

    /// Show a neutral placeholder of the reserved size
    fn show_placeholder(&self, container: &ContainerId, width: u32, height: u32);

    /// Replace the slot with the static fallback
    fn show_fallback(&self, container: &ContainerId, width: u32, height: u32);

    /// Empty the container
    fn clear_container(&self, container: &ContainerId);

    /// Remove the marker from `container`. Returns whether one existed.
    fn remove_marker(&self, container: &ContainerId) -> bool;

    /// Append `marker` to `container`
    fn insert_marker(&self, container: &ContainerId, marker: &AdMarker) -> Result<(), HostError>;

    /// Render evidence of the marker in `container`, `None` without a marker
    fn marker_evidence(&self, container: &ContainerId) -> Option<RenderEvidence>;

    /// Whether a script tag with `src` is in the document
    fn has_script(&self, src: &str) -> bool;

    /// Append `tag` and wait for its load or error event
    async fn inject_script(&self, tag: &ScriptTag) -> Result<(), HostError>;

    /// Remove the script tag with `src`
    fn remove_script(&self, src: &str);

    /// Whether the network runtime object exists
    fn runtime_ready(&self) -> bool;
}
