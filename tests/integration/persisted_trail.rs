//! Persisted debug trail on the file store

use crate::common::config;
use adslot_resilience::loader::{AdLoadingManager, ContainerId, InMemoryPage, ScriptLoader};
use adslot_resilience::logging::{AdLogger, FileStore, KeyValueStore, LoggerConfig};
use std::sync::Arc;
use tempfile::TempDir;

fn persisting_logger(store: Arc<dyn KeyValueStore>, cap: usize) -> Arc<AdLogger> {
    Arc::new(
        AdLogger::new(
            LoggerConfig::default()
                .with_console(false)
                .with_persist(true)
                .with_persist_cap(cap),
        )
        .with_store(store),
    )
}

async fn load_once(logger: Arc<AdLogger>) {
    let page = Arc::new(InMemoryPage::new());
    let container = ContainerId::new("ad-top");
    page.add_container(container.clone(), 320, 100);
    let scripts = Arc::new(ScriptLoader::new(page.clone()));
    let manager = AdLoadingManager::new(config(3), page, scripts)
        .unwrap()
        .with_logger(logger);
    assert!(manager.load_ad(Some(container)).await);
}

#[tokio::test(start_paused = true)]
async fn test_trail_survives_logger_restart() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp_dir.path()));

    load_once(persisting_logger(store.clone(), 100)).await;

    // A new logger over the same directory sees the earlier session
    let restarted = persisting_logger(Arc::new(FileStore::new(temp_dir.path())), 100);
    let trail = restarted.persisted_logs();
    assert!(!trail.is_empty());
    assert!(trail
        .iter()
        .any(|entry| entry.event_type() == Some("load_success")));
    assert!(restarted.logs().is_empty());
    assert!(temp_dir.path().join("adslot_debug_logs.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_trail_is_capped() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp_dir.path()));
    let logger = persisting_logger(store, 3);

    load_once(logger.clone()).await;
    load_once(logger.clone()).await;

    let trail = logger.persisted_logs();
    assert_eq!(trail.len(), 3);
    // Newest entries are kept
    let last_buffered = logger.logs().last().cloned().unwrap();
    assert_eq!(trail.last().unwrap().id, last_buffered.id);
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_store_is_swallowed() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way").unwrap();

    let logger = persisting_logger(Arc::new(FileStore::new(&blocker)), 100);
    load_once(logger.clone()).await;

    assert!(logger.persisted_logs().is_empty());
    assert!(!logger.logs().is_empty());
}
