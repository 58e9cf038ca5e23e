//! Event log exports and metrics through the public API

use adslot_resilience::logging::{AdLogger, LogEntry, LogLevel, LoggerConfig};
use adslot_resilience::{ErrorCategory, LoadingState, RecoveryStrategy};
use std::time::Duration;

fn logger() -> AdLogger {
    AdLogger::new(LoggerConfig::default().with_console(false))
}

#[test]
fn test_json_export_parses_back() {
    let logger = logger();
    logger.log_load_start("DAN-a", 0);
    logger.log_load_error("DAN-a", "Script load failed", ErrorCategory::ScriptLoad, 0);
    logger.log_retry("DAN-a", 1, RecoveryStrategy::ScriptReload, Duration::from_millis(2000));

    let json = logger.export_json().unwrap();
    let entries: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
    assert_eq!(entries, logger.logs());
    assert_eq!(entries[1].level, LogLevel::Error);
    assert_eq!(entries[1].data["errorType"], "SCRIPT_LOAD_ERROR");
    assert_eq!(entries[2].data["strategy"], "SCRIPT_RELOAD");
    assert_eq!(entries[2].data["delay"], 2000);
}

#[test]
fn test_csv_export_has_one_row_per_entry() {
    let logger = logger();
    logger.log_load_start("DAN-a", 0);
    logger.log_load_success("DAN-a", Duration::from_millis(420), 0);

    let csv = logger.export_csv().unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("placementId"));
    assert!(lines[2].contains("load_success"));
}

#[test]
fn test_debug_entries_gated_but_metrics_counted() {
    let logger = logger();
    logger.log_state_change("DAN-a", LoadingState::Idle, LoadingState::Loading, 0);
    logger.log_load_start("DAN-a", 0);
    logger.log_load_success("DAN-a", Duration::from_millis(100), 0);
    logger.log_load_start("DAN-a", 0);
    logger.log_load_success("DAN-a", Duration::from_millis(300), 0);

    // State changes are DEBUG and below the default INFO floor
    assert_eq!(logger.len(), 4);
    let metrics = logger.metrics();
    assert_eq!(metrics.total_attempts, 2);
    assert_eq!(metrics.average_load_time, 200.0);
    assert_eq!(metrics.success_rate, "100.00%");
    assert_eq!(metrics.error_rate, "0.00%");
}

#[test]
fn test_ring_buffer_keeps_newest() {
    let logger = AdLogger::new(LoggerConfig::default().with_console(false).with_max_logs(2));
    for retry in 0..5 {
        logger.log_load_start("DAN-a", retry);
    }
    let entries = logger.logs();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].data["retryCount"], 3);
    assert_eq!(entries[1].data["retryCount"], 4);
    assert_eq!(logger.metrics().total_attempts, 5);
}
