//! Scriptable in-process page
//!
//! [`InMemoryPage`] implements [`PageHost`] without a browser. Script outcomes,
//! runtime readiness and render behaviour are configured up front, which is
//! what the simulator and the test-suite drive.

use super::host::{
    AdMarker, ContainerId, ContainerStatus, HostError, PageHost, RenderEvidence, ScriptTag,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// How the next script injection resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Load event fires straight away
    Load,
    /// Load event fires after a delay
    LoadAfter(Duration),
    /// Error event fires with this message
    Fail(String),
    /// Neither event ever fires
    Hang,
}

/// How the network script renders into a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBehavior {
    /// Creative appears as soon as the marker exists
    Immediate,
    /// Creative appears this long after the marker was inserted
    After(Duration),
    /// Marker stays empty
    Never,
}

/// What the slot currently shows besides the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotContent {
    /// Nothing
    Empty,
    /// Neutral loading placeholder
    Placeholder,
    /// Static fallback
    Fallback,
}

#[derive(Debug)]
struct ContainerState {
    status: ContainerStatus,
    marker: Option<(AdMarker, Instant)>,
    content: SlotContent,
    marker_insertions: u32,
    clears: u32,
}

#[derive(Debug)]
struct PageState {
    containers: HashMap<ContainerId, ContainerState>,
    scripts: Vec<String>,
    runtime_ready_at: Option<Instant>,
    runtime_delay: Option<Duration>,
    outcomes: VecDeque<ScriptOutcome>,
    default_outcome: ScriptOutcome,
    render: RenderBehavior,
    marker_failure: Option<String>,
    injections: u32,
}

/// In-memory [`PageHost`]
#[derive(Debug)]
pub struct InMemoryPage {
    state: Mutex<PageState>,
}

impl Default for InMemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPage {
    /// Page whose script loads and renders immediately
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState {
                containers: HashMap::new(),
                scripts: Vec::new(),
                runtime_ready_at: None,
                runtime_delay: Some(Duration::ZERO),
                outcomes: VecDeque::new(),
                default_outcome: ScriptOutcome::Load,
                render: RenderBehavior::Immediate,
                marker_failure: None,
                injections: 0,
            }),
        }
    }

    /// Outcome used once the queued outcomes run out
    pub fn with_default_script_outcome(self, outcome: ScriptOutcome) -> Self {
        self.state.lock().default_outcome = outcome;
        self
    }

    /// Render behaviour for every marker
    pub fn with_render_behavior(self, render: RenderBehavior) -> Self {
        self.state.lock().render = render;
        self
    }

    /// Delay between the script load event and the runtime object appearing;
    /// `None` means it never appears
    pub fn with_runtime_delay(self, delay: Option<Duration>) -> Self {
        self.state.lock().runtime_delay = delay;
        self
    }

    /// Queue the outcome of the next injection
    pub fn push_script_outcome(&self, outcome: ScriptOutcome) {
        self.state.lock().outcomes.push_back(outcome);
    }

    /// Change render behaviour
    pub fn set_render_behavior(&self, render: RenderBehavior) {
        self.state.lock().render = render;
    }

    /// Make marker insertion fail with `message` (`None` restores it)
    pub fn set_marker_failure(&self, message: Option<String>) {
        self.state.lock().marker_failure = message;
    }

    /// Add an attached container of the given size
    pub fn add_container(&self, container: ContainerId, width: u32, height: u32) {
        self.state.lock().containers.insert(
            container,
            ContainerState {
                status: ContainerStatus {
                    attached: true,
                    width,
                    height,
                },
                marker: None,
                content: SlotContent::Empty,
                marker_insertions: 0,
                clears: 0,
            },
        );
    }

    /// Detach a container from the document
    pub fn detach_container(&self, container: &ContainerId) {
        if let Some(state) = self.state.lock().containers.get_mut(container) {
            state.status.attached = false;
        }
    }

    /// Remove a container entirely
    pub fn remove_container(&self, container: &ContainerId) {
        self.state.lock().containers.remove(container);
    }

    /// Script injections so far
    pub fn injections(&self) -> u32 {
        self.state.lock().injections
    }

    /// Script tags currently in the head with `src`
    pub fn script_count(&self, src: &str) -> usize {
        self.state.lock().scripts.iter().filter(|s| *s == src).count()
    }

    /// Current marker in `container`
    pub fn marker(&self, container: &ContainerId) -> Option<AdMarker> {
        self.state
            .lock()
            .containers
            .get(container)
            .and_then(|c| c.marker.as_ref().map(|(marker, _)| marker.clone()))
    }

    /// Markers ever inserted into `container`
    pub fn marker_insertions(&self, container: &ContainerId) -> u32 {
        self.state
            .lock()
            .containers
            .get(container)
            .map_or(0, |c| c.marker_insertions)
    }

    /// Times `container` was cleared
    pub fn clears(&self, container: &ContainerId) -> u32 {
        self.state
            .lock()
            .containers
            .get(container)
            .map_or(0, |c| c.clears)
    }

    /// Non-marker content of `container`
    pub fn content(&self, container: &ContainerId) -> Option<SlotContent> {
        self.state.lock().containers.get(container).map(|c| c.content)
    }

    fn set_content(&self, container: &ContainerId, content: SlotContent) {
        if let Some(state) = self.state.lock().containers.get_mut(container) {
            state.content = content;
        }
    }

    fn mark_loaded(&self) {
        let mut state = self.state.lock();
        state.runtime_ready_at = state.runtime_delay.map(|delay| Instant::now() + delay);
    }
}

#[async_trait]
impl PageHost for InMemoryPage {
    fn container_status(&self, container: &ContainerId) -> Option<ContainerStatus> {
        self.state.lock().containers.get(container).map(|c| c.status)
    }

    fn show_placeholder(&self, container: &ContainerId, _width: u32, _height: u32) {
        self.set_content(container, SlotContent::Placeholder);
    }

    fn show_fallback(&self, container: &ContainerId, _width: u32, _height: u32) {
        self.set_content(container, SlotContent::Fallback);
    }

    fn clear_container(&self, container: &ContainerId) {
        if let Some(state) = self.state.lock().containers.get_mut(container) {
            state.marker = None;
            state.content = SlotContent::Empty;
            state.clears += 1;
        }
    }

    fn remove_marker(&self, container: &ContainerId) -> bool {
        self.state
            .lock()
            .containers
            .get_mut(container)
            .and_then(|c| c.marker.take())
            .is_some()
    }

    fn insert_marker(&self, container: &ContainerId, marker: &AdMarker) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if let Some(message) = state.marker_failure.clone() {
            return Err(HostError::MarkerInsertion(message));
        }
        let slot = state
            .containers
            .get_mut(container)
            .ok_or_else(|| HostError::ContainerNotFound(container.to_string()))?;
        slot.marker = Some((marker.clone(), Instant::now()));
        slot.marker_insertions += 1;
        trace!(container = %container, html = %marker.to_html(), "Marker inserted");
        Ok(())
    }

    fn marker_evidence(&self, container: &ContainerId) -> Option<RenderEvidence> {
        let state = self.state.lock();
        let (marker, inserted_at) = state.containers.get(container)?.marker.as_ref()?;
        let runtime_ready = state
            .runtime_ready_at
            .is_some_and(|ready_at| Instant::now() >= ready_at);

        let rendered = runtime_ready
            && match state.render {
                RenderBehavior::Immediate => true,
                RenderBehavior::After(delay) => Instant::now() >= *inserted_at + delay,
                RenderBehavior::Never => false,
            };

        Some(if rendered {
            RenderEvidence::rendered(marker.width, marker.height)
        } else {
            RenderEvidence::default()
        })
    }

    fn has_script(&self, src: &str) -> bool {
        self.state.lock().scripts.iter().any(|s| s == src)
    }

    async fn inject_script(&self, tag: &ScriptTag) -> Result<(), HostError> {
        let outcome = {
            let mut state = self.state.lock();
            state.scripts.push(tag.src.clone());
            state.injections += 1;
            let default = state.default_outcome.clone();
            state.outcomes.pop_front().unwrap_or(default)
        };
        trace!(html = %tag.to_html(), ?outcome, "Script injected");

        match outcome {
            ScriptOutcome::Load => {
                self.mark_loaded();
                Ok(())
            }
            ScriptOutcome::LoadAfter(delay) => {
                tokio::time::sleep(delay).await;
                self.mark_loaded();
                Ok(())
            }
            ScriptOutcome::Fail(message) => Err(HostError::ScriptFailed(message)),
            ScriptOutcome::Hang => std::future::pending().await,
        }
    }

    fn remove_script(&self, src: &str) {
        self.state.lock().scripts.retain(|s| s != src);
    }

    fn runtime_ready(&self) -> bool {
        self.state
            .lock()
            .runtime_ready_at
            .is_some_and(|ready_at| Instant::now() >= ready_at)
    }
}
