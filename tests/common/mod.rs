//! Shared fixtures for integration tests

use adslot_resilience::config::SessionConfig;
use adslot_resilience::loader::{
    AdLoadingManager, ContainerId, InMemoryPage, RecordingObserver, ScriptLoader,
};
use adslot_resilience::logging::{AdLogger, LoggerConfig};
use std::sync::Arc;

/// One placement wired to an in-memory page
pub struct Placement {
    pub page: Arc<InMemoryPage>,
    pub container: ContainerId,
    pub observer: Arc<RecordingObserver>,
    pub manager: Arc<AdLoadingManager>,
}

pub fn quiet_logger() -> Arc<AdLogger> {
    Arc::new(AdLogger::new(LoggerConfig::default().with_console(false)))
}

pub fn placement(page: InMemoryPage, config: SessionConfig) -> Placement {
    let page = Arc::new(page);
    let container = ContainerId::new("ad-top");
    page.add_container(container.clone(), config.width, config.height);
    let scripts = Arc::new(ScriptLoader::new(page.clone()));
    let observer = Arc::new(RecordingObserver::new());
    let manager = AdLoadingManager::new(config, page.clone(), scripts)
        .unwrap()
        .with_observer(observer.clone())
        .with_logger(quiet_logger());
    Placement {
        page,
        container,
        observer,
        manager: Arc::new(manager),
    }
}

pub fn config(max_retries: u32) -> SessionConfig {
    SessionConfig::new("DAN-integration", 320, 100)
        .unwrap()
        .with_max_retries(max_retries)
}
