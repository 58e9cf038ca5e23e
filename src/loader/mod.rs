//! Ad loading: page host seam, shared script loader and the per-placement manager

pub mod host;
pub mod manager;
pub mod observer;
pub mod page;
pub mod script;
pub mod session;

pub use host::{
    AdMarker, ContainerId, ContainerStatus, HostError, PageHost, RenderEvidence, ScriptTag,
};
pub use manager::AdLoadingManager;
pub use observer::{
    ErrorEvent, LoadObserver, NoopObserver, ObservedEvent, RecordingObserver, StateChangeEvent,
    SuccessEvent,
};
pub use page::{InMemoryPage, RenderBehavior, ScriptOutcome, SlotContent};
pub use script::{ScriptError, ScriptLoader, ScriptStatus};
pub use session::{ContainerProblem, LoadError, LoadSession};
