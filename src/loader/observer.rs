//! Display-layer callbacks

use crate::{ErrorCategory, LoadingState, RecoveryStrategy};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// `onStateChange` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeEvent {
    /// State before the transition
    pub old_state: LoadingState,
    /// State after the transition
    pub new_state: LoadingState,
    /// Retries used so far
    pub retry_count: u32,
    /// Placement
    pub placement_id: String,
}

/// `onError` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Error text
    pub error: String,
    /// Retries used so far
    pub retry_count: u32,
    /// Placement
    pub placement_id: String,
    /// Classified category
    pub category: ErrorCategory,
    /// Recovery strategy about to run
    pub strategy: RecoveryStrategy,
}

/// `onSuccess` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEvent {
    /// Milliseconds from the first attempt's start to verified render
    pub load_time: u64,
    /// Retries it took
    pub retry_count: u32,
    /// Placement
    pub placement_id: String,
}

/// Receives session notifications. All methods default to no-ops.
///
/// A panicking observer is caught by the manager and never reaches the host.
pub trait LoadObserver: Send + Sync {
    /// State machine transition
    fn on_state_change(&self, _event: &StateChangeEvent) {}

    /// Failed attempt that will be retried
    fn on_error(&self, _event: &ErrorEvent) {}

    /// Verified render
    fn on_success(&self, _event: &SuccessEvent) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LoadObserver for NoopObserver {}

/// Event as seen by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    /// `on_state_change`
    StateChange(StateChangeEvent),
    /// `on_error`
    Error(ErrorEvent),
    /// `on_success`
    Success(SuccessEvent),
}

/// Observer that keeps every event, in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// State transitions as `(old, new)` pairs
    pub fn transitions(&self) -> Vec<(LoadingState, LoadingState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::StateChange(e) => Some((e.old_state, e.new_state)),
                _ => None,
            })
            .collect()
    }

    /// `on_error` payloads
    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// `on_success` payloads
    pub fn successes(&self) -> Vec<SuccessEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Success(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of callbacks received
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no callback was received
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl LoadObserver for RecordingObserver {
    fn on_state_change(&self, event: &StateChangeEvent) {
        self.events
            .lock()
            .push(ObservedEvent::StateChange(event.clone()));
    }

    fn on_error(&self, event: &ErrorEvent) {
        self.events.lock().push(ObservedEvent::Error(event.clone()));
    }

    fn on_success(&self, event: &SuccessEvent) {
        self.events.lock().push(ObservedEvent::Success(event.clone()));
    }
}
