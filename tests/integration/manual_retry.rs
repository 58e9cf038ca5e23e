//! Sessions with automatic retry disabled

use crate::common::{config, placement};
use adslot_resilience::loader::{InMemoryPage, ScriptOutcome, SlotContent};
use adslot_resilience::{LoadingState, RecoveryStrategy};

#[tokio::test(start_paused = true)]
async fn test_parked_dom_error_recovers_after_reattach() {
    let p = placement(InMemoryPage::new(), config(3).with_auto_retry(false));
    p.page.detach_container(&p.container);

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);
    assert_eq!(p.manager.state(), LoadingState::Error);
    assert_eq!(p.manager.retry_count(), 0);
    assert_eq!(p.observer.errors()[0].strategy, RecoveryStrategy::DomReset);

    p.page.add_container(p.container.clone(), 320, 100);
    assert!(p.manager.retry(Some(p.container.clone())).await);

    assert_eq!(p.manager.state(), LoadingState::Success);
    assert_eq!(p.manager.retry_count(), 1);
    // DOM reset cleared the slot before the second attempt
    assert_eq!(p.page.clears(&p.container), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_is_noop_when_exhausted() {
    let page = InMemoryPage::new()
        .with_default_script_outcome(ScriptOutcome::Fail("Script load failed".into()));
    let p = placement(page, config(1).with_auto_retry(false));

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);
    assert_eq!(p.manager.state(), LoadingState::Error);

    // Last allowed retry fails and falls back
    assert!(!p.manager.retry(Some(p.container.clone())).await);
    assert_eq!(p.manager.state(), LoadingState::Fallback);
    assert_eq!(p.page.content(&p.container), Some(SlotContent::Fallback));

    let injections = p.page.injections();
    assert!(!p.manager.retry(Some(p.container.clone())).await);
    assert_eq!(p.page.injections(), injections);
    assert_eq!(p.manager.retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_before_load_is_noop() {
    let p = placement(InMemoryPage::new(), config(3).with_auto_retry(false));
    assert!(!p.manager.retry(Some(p.container.clone())).await);
    assert_eq!(p.manager.state(), LoadingState::Idle);
    assert!(p.observer.is_empty());
}
