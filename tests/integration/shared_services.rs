//! Several placements sharing one page, script loader, logger, planner and monitor

use crate::common::quiet_logger;
use adslot_resilience::config::{SessionConfig, AD_SCRIPT_URL};
use adslot_resilience::loader::{
    AdLoadingManager, ContainerId, InMemoryPage, RecordingObserver, ScriptLoader, ScriptOutcome,
};
use adslot_resilience::logging::{EventType, LogFilter, LogLevel};
use adslot_resilience::monitor::{FixedMemoryProbe, MonitorConfig, PerformanceMonitor};
use adslot_resilience::recovery::RecoveryPlanner;
use adslot_resilience::LoadingState;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

struct Page {
    page: Arc<InMemoryPage>,
    managers: Vec<(Arc<AdLoadingManager>, ContainerId, Arc<RecordingObserver>)>,
    planner: Arc<RecoveryPlanner>,
    monitor: Arc<PerformanceMonitor>,
}

fn page_with(count: usize, page: InMemoryPage) -> Page {
    let page = Arc::new(page);
    let scripts = Arc::new(ScriptLoader::new(page.clone()));
    let logger = quiet_logger();
    let planner = Arc::new(RecoveryPlanner::default());
    let monitor = Arc::new(PerformanceMonitor::with_probe(
        MonitorConfig::default(),
        Arc::new(FixedMemoryProbe::new(8 * 1024 * 1024)),
    ));

    let managers = (0..count)
        .map(|n| {
            let container = ContainerId::new(format!("slot-{n}"));
            page.add_container(container.clone(), 300, 250);
            let observer = Arc::new(RecordingObserver::new());
            let config = SessionConfig::new(format!("DAN-{n}"), 300, 250).unwrap();
            let manager = AdLoadingManager::new(config, page.clone(), scripts.clone())
                .unwrap()
                .with_logger(logger.clone())
                .with_planner(planner.clone())
                .with_monitor(monitor.clone())
                .with_observer(observer.clone());
            (Arc::new(manager), container, observer)
        })
        .collect();

    Page {
        page,
        managers,
        planner,
        monitor,
    }
}

async fn load_all(page: &Page) -> Vec<bool> {
    join_all(page.managers.iter().map(|(manager, container, _)| {
        let manager = manager.clone();
        let container = container.clone();
        async move { manager.load_ad(Some(container)).await }
    }))
    .await
}

#[tokio::test(start_paused = true)]
async fn test_script_injected_once_for_concurrent_placements() {
    let page = page_with(
        4,
        InMemoryPage::new()
            .with_default_script_outcome(ScriptOutcome::LoadAfter(Duration::from_millis(300))),
    );

    let results = load_all(&page).await;

    assert!(results.into_iter().all(|loaded| loaded));
    assert_eq!(page.page.injections(), 1);
    assert_eq!(page.page.script_count(AD_SCRIPT_URL), 1);
    for (manager, container, observer) in &page.managers {
        assert_eq!(manager.state(), LoadingState::Success);
        assert_eq!(observer.successes().len(), 1);
        assert_eq!(
            page.page.marker(container).unwrap().ad_unit,
            manager.config().placement_id
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_shared_script_failure_recovers_everyone() {
    let inner = InMemoryPage::new();
    inner.push_script_outcome(ScriptOutcome::Fail("Script load failed".into()));
    let page = page_with(3, inner);

    let results = load_all(&page).await;

    assert!(results.into_iter().all(|loaded| loaded));
    let stats = page.planner.stats();
    assert!(stats.total_errors >= 1);
    assert_eq!(
        page.monitor.generate_performance_report().successful_loads,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_shared_logger_filters_by_placement() {
    let page = page_with(2, InMemoryPage::new());
    load_all(&page).await;

    let logger = page.managers[0].0.logger();
    let first = logger.filter(&LogFilter::default().with_placement_id("DAN-0"));
    assert!(!first.is_empty());
    assert!(first.iter().all(|e| e.placement_id() == Some("DAN-0")));

    let successes = logger.filter(
        &LogFilter::default()
            .with_level(LogLevel::Info)
            .with_event_type(EventType::LoadSuccess),
    );
    assert_eq!(successes.len(), 2);
    assert_eq!(logger.metrics().success_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_report_covers_all_placements() {
    let page = page_with(3, InMemoryPage::new());
    load_all(&page).await;

    let report = page.monitor.generate_performance_report();
    assert_eq!(report.total_loads, 3);
    assert_eq!(report.success_rate, 100.0);
    assert_eq!(report.active_sessions, 0);
    assert_eq!(report.memory.current_bytes, 8 * 1024 * 1024);
    assert!(report.memory.available);
    assert!(report.leak_suspects.is_empty());
}
