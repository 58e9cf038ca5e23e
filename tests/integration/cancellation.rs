//! Session teardown while work is in flight

use crate::common::{config, placement};
use adslot_resilience::loader::{InMemoryPage, ScriptOutcome};
use adslot_resilience::LoadingState;
use std::time::Duration;

/// Scenario D: cleanup mid-LOADING silences the orphaned attempt
#[tokio::test(start_paused = true)]
async fn test_cleanup_mid_loading_fires_no_callbacks() {
    let page = InMemoryPage::new()
        .with_default_script_outcome(ScriptOutcome::LoadAfter(Duration::from_secs(5)));
    let p = placement(page, config(3));

    let manager = p.manager.clone();
    let container = p.container.clone();
    let load = tokio::spawn(async move { manager.load_ad(Some(container)).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(p.manager.state(), LoadingState::Loading);
    let events_before = p.observer.len();

    p.manager.cleanup();
    assert!(!load.await.unwrap());

    // Let the orphaned script load resolve
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(p.observer.len(), events_before);
    assert!(p.observer.successes().is_empty());
    assert!(p.observer.errors().is_empty());
    assert_eq!(p.manager.state(), LoadingState::Loading);
    assert!(p.manager.is_destroyed());
    assert!(p.page.marker(&p.container).is_none());
    assert_eq!(p.manager.monitor().active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_during_backoff() {
    let page = InMemoryPage::new()
        .with_default_script_outcome(ScriptOutcome::Fail("Script load failed".into()));
    let p = placement(page, config(3));

    let manager = p.manager.clone();
    let container = p.container.clone();
    let load = tokio::spawn(async move { manager.load_ad(Some(container)).await });

    // First failure schedules a 2000ms reload backoff
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(p.manager.state(), LoadingState::Error);
    assert_eq!(p.observer.errors().len(), 1);

    p.manager.cleanup();
    assert!(!load.await.unwrap());
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(p.manager.state(), LoadingState::Error);
    assert_eq!(p.page.injections(), 1);
    assert_eq!(p.observer.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_twice_and_late_calls() {
    let p = placement(InMemoryPage::new(), config(3));
    assert!(p.manager.load_ad(Some(p.container.clone())).await);

    p.manager.cleanup();
    p.manager.cleanup();

    assert!(p.manager.is_destroyed());
    assert!(p.manager.session().destroyed);
    // Late calls are no-ops
    assert!(!p.manager.load_ad(Some(p.container.clone())).await);
    assert!(!p.manager.retry(Some(p.container.clone())).await);
    assert_eq!(p.observer.successes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_cancels_token() {
    let p = placement(InMemoryPage::new(), config(3));
    let token = p.manager.cancellation_token().clone();
    drop(p.manager);
    assert!(token.is_cancelled());
}
