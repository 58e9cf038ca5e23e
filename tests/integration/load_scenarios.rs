//! End-to-end load scenarios against the in-memory page
//!
//! Timer-driven: every test runs on a paused clock so backoff waits, render
//! checks and timeouts resolve instantly and deterministically.

use crate::common::{config, placement};
use adslot_resilience::config::AD_SCRIPT_URL;
use adslot_resilience::loader::{InMemoryPage, RenderBehavior, ScriptOutcome, SlotContent};
use adslot_resilience::{ErrorCategory, LoadingState, RecoveryStrategy};
use std::time::Duration;
use tokio::time::Instant;

/// Scenario A: everything resolves on the first check
#[tokio::test(start_paused = true)]
async fn test_immediate_success() {
    let p = placement(InMemoryPage::new(), config(3));

    assert!(p.manager.load_ad(Some(p.container.clone())).await);

    assert_eq!(p.manager.state(), LoadingState::Success);
    assert_eq!(p.manager.retry_count(), 0);
    assert_eq!(p.observer.successes().len(), 1);
    assert_eq!(p.observer.successes()[0].retry_count, 0);
    assert!(p.observer.errors().is_empty());
    assert_eq!(p.page.script_count(AD_SCRIPT_URL), 1);
    assert_eq!(p.page.marker_insertions(&p.container), 1);
}

/// Scenario B: script never loads, two retries, then fallback
#[tokio::test(start_paused = true)]
async fn test_script_failure_exhausts_retries() {
    let page = InMemoryPage::new()
        .with_default_script_outcome(ScriptOutcome::Fail("Script load failed".into()));
    let p = placement(page, config(2));
    let started = Instant::now();

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);

    assert_eq!(p.manager.state(), LoadingState::Fallback);
    assert_eq!(p.manager.retry_count(), 2);
    assert!(p.observer.successes().is_empty());

    let errors = p.observer.errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].strategy, RecoveryStrategy::ScriptReload);
    assert_eq!(errors[1].strategy, RecoveryStrategy::DelayedRetry);
    assert!(errors
        .iter()
        .all(|e| e.category == ErrorCategory::ScriptLoad && e.error == "Script load failed"));

    use LoadingState::*;
    assert_eq!(
        p.observer.transitions(),
        vec![
            (Idle, Loading),
            (Loading, Error),
            (Error, Loading),
            (Loading, Error),
            (Error, Loading),
            (Loading, Error),
            (Error, Fallback),
        ]
    );

    // 2000ms (reload) + 4000ms (delayed retry) of backoff
    assert!(started.elapsed() >= Duration::from_millis(6000));
    assert_eq!(p.page.content(&p.container), Some(SlotContent::Fallback));
    assert_eq!(p.page.injections(), 3);

    let stats = p.manager.planner().stats();
    assert_eq!(stats.total_errors, 3);
    assert_eq!(
        stats.errors_by_strategy.get(&RecoveryStrategy::FallbackDisplay),
        Some(&1)
    );
}

/// Scenario C: no container at all
#[tokio::test(start_paused = true)]
async fn test_null_container_is_dom_error() {
    let p = placement(InMemoryPage::new(), config(3));

    assert!(!p.manager.load_ad(None).await);

    let errors = p.observer.errors();
    assert_eq!(errors[0].category, ErrorCategory::Dom);
    assert_eq!(errors[0].strategy, RecoveryStrategy::DomReset);
    assert_eq!(errors[0].retry_count, 0);
    assert_eq!(p.page.injections(), 0);
    assert_eq!(p.manager.state(), LoadingState::Fallback);
    assert_eq!(p.manager.retry_count(), 1);
}

/// The decision table falls back before retries run out: only the retried
/// failure reaches onError
#[tokio::test(start_paused = true)]
async fn test_early_fallback_skips_on_error() {
    let p = placement(InMemoryPage::new(), config(3));
    p.page.detach_container(&p.container);

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);

    let errors = p.observer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].strategy, RecoveryStrategy::DomReset);
    assert!(errors
        .iter()
        .all(|e| e.strategy != RecoveryStrategy::FallbackDisplay));

    let transitions = p.observer.transitions();
    assert_eq!(
        transitions.last(),
        Some(&(LoadingState::Error, LoadingState::Fallback))
    );
    assert_eq!(p.manager.retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_size_container_rejected() {
    let p = placement(InMemoryPage::new(), config(3));
    p.page.add_container(p.container.clone(), 0, 100);

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);
    assert_eq!(
        p.observer.errors()[0].error,
        "Invalid container element: container has zero size"
    );
    assert_eq!(p.page.injections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_script_times_out() {
    let page = InMemoryPage::new().with_default_script_outcome(ScriptOutcome::Hang);
    let p = placement(
        page,
        config(1).with_load_timeout(Duration::from_secs(3)),
    );
    let started = Instant::now();

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);

    use LoadingState::*;
    assert_eq!(
        p.observer.transitions(),
        vec![
            (Idle, Loading),
            (Loading, Timeout),
            (Timeout, Loading),
            (Loading, Timeout),
            (Timeout, Fallback),
        ]
    );
    let errors = p.observer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, ErrorCategory::Timeout);
    assert_eq!(errors[0].strategy, RecoveryStrategy::DelayedRetry);
    // Two 3s budgets plus 1800ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(7800));
}

#[tokio::test(start_paused = true)]
async fn test_delayed_render_is_verified() {
    let page = InMemoryPage::new().with_render_behavior(RenderBehavior::After(Duration::from_millis(500)));
    let p = placement(page, config(3));

    assert!(p.manager.load_ad(Some(p.container.clone())).await);

    let load_time = p.manager.load_time().unwrap();
    assert!(load_time >= Duration::from_millis(500));
    assert!(load_time < Duration::from_secs(1));
    assert_eq!(p.observer.successes()[0].load_time, load_time.as_millis() as u64);
}

#[tokio::test(start_paused = true)]
async fn test_slow_runtime_still_succeeds() {
    let page = InMemoryPage::new().with_runtime_delay(Some(Duration::from_millis(1200)));
    let p = placement(page, config(3));

    assert!(p.manager.load_ad(Some(p.container.clone())).await);
    assert_eq!(p.manager.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_retries_then_recovers() {
    let p = placement(
        InMemoryPage::new().with_render_behavior(RenderBehavior::Never),
        config(3),
    );

    let manager = p.manager.clone();
    let container = p.container.clone();
    let load = tokio::spawn(async move { manager.load_ad(Some(container)).await });

    // First attempt exhausts its render checks, then the creative starts working
    tokio::time::sleep(Duration::from_millis(3500)).await;
    p.page.set_render_behavior(RenderBehavior::Immediate);

    assert!(load.await.unwrap());
    assert_eq!(p.manager.retry_count(), 1);
    let errors = p.observer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, ErrorCategory::AdRender);
    assert_eq!(errors[0].strategy, RecoveryStrategy::ImmediateRetry);

    let rates = p.manager.planner().stats().recovery_success_rate;
    assert_eq!(rates[&RecoveryStrategy::ImmediateRetry].percentage, "100.00%");
}

#[tokio::test(start_paused = true)]
async fn test_marker_failure_is_dom_error() {
    let page = InMemoryPage::new();
    page.set_marker_failure(Some("quota exceeded".into()));
    let p = placement(page, config(3));

    assert!(!p.manager.load_ad(Some(p.container.clone())).await);
    let errors = p.observer.errors();
    assert_eq!(errors[0].category, ErrorCategory::Dom);
    assert_eq!(
        errors[0].error,
        "Failed to create ad marker element: marker insertion failed: quota exceeded"
    );
}

#[tokio::test(start_paused = true)]
async fn test_logger_and_monitor_track_attempts() {
    let page = InMemoryPage::new();
    page.push_script_outcome(ScriptOutcome::Fail("net::ERR_CONNECTION_RESET".into()));
    let p = placement(page, config(3));

    assert!(p.manager.load_ad(Some(p.container.clone())).await);

    let metrics = p.manager.logger().metrics();
    assert_eq!(metrics.total_attempts, 2);
    assert_eq!(metrics.success_count, 1);
    assert_eq!(metrics.error_count, 1);
    assert_eq!(metrics.retry_count, 1);
    assert_eq!(metrics.success_rate, "50.00%");
    assert_eq!(metrics.errors_by_category.get(&ErrorCategory::Network), Some(&1));

    let report = p.manager.monitor().generate_performance_report();
    assert_eq!(report.total_loads, 2);
    assert_eq!(report.successful_loads, 1);
    assert_eq!(report.active_sessions, 0);
}
