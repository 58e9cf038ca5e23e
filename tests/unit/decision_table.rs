//! Strategy table and backoff through the public API

use adslot_resilience::recovery::{
    calculate_retry_delay, determine_recovery_strategy, should_retry, ErrorContext, ErrorRecord,
    RecoveryAction, RecoveryPlanner,
};
use adslot_resilience::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use std::time::Duration;

#[test]
fn test_strategy_progression_per_category() {
    use ErrorCategory::*;
    use RecoveryStrategy::*;

    let cases = [
        (ScriptLoad, [ScriptReload, DelayedRetry, FallbackDisplay]),
        (Dom, [DomReset, FallbackDisplay, FallbackDisplay]),
        (AdRender, [ImmediateRetry, ImmediateRetry, FallbackDisplay]),
        (Network, [DelayedRetry, DelayedRetry, FallbackDisplay]),
        (Timeout, [DelayedRetry, DelayedRetry, FallbackDisplay]),
        (Validation, [DomReset, FallbackDisplay, FallbackDisplay]),
        (Unknown, [DelayedRetry, FallbackDisplay, FallbackDisplay]),
    ];
    for (category, expected) in cases {
        for (retry_count, strategy) in expected.into_iter().enumerate() {
            assert_eq!(
                determine_recovery_strategy(category, retry_count as u32, 10),
                strategy,
                "{category} at {retry_count}"
            );
        }
    }
}

#[test]
fn test_limit_overrides_table() {
    assert_eq!(
        determine_recovery_strategy(ErrorCategory::Network, 1, 1),
        RecoveryStrategy::FallbackDisplay
    );
    assert_eq!(
        determine_recovery_strategy(ErrorCategory::AdRender, 0, 0),
        RecoveryStrategy::FallbackDisplay
    );
}

#[test]
fn test_backoff_is_capped() {
    assert_eq!(
        calculate_retry_delay(ErrorCategory::ScriptLoad, 0),
        Duration::from_millis(2000)
    );
    assert_eq!(
        calculate_retry_delay(ErrorCategory::Network, 10),
        Duration::from_millis(30_000)
    );
    assert_eq!(
        calculate_retry_delay(ErrorCategory::Unknown, u32::MAX),
        Duration::from_millis(30_000)
    );
}

#[test]
fn test_dom_errors_retry_once() {
    assert!(should_retry(0, 3, ErrorCategory::Dom, ErrorSeverity::High));
    assert!(!should_retry(1, 3, ErrorCategory::Dom, ErrorSeverity::High));
    assert!(should_retry(1, 3, ErrorCategory::Network, ErrorSeverity::Medium));
    assert!(!should_retry(0, 3, ErrorCategory::Network, ErrorSeverity::Critical));
}

#[test]
fn test_planner_decision_carries_plan() {
    let planner = RecoveryPlanner::default();
    let decision = planner.handle_error(
        Some(&ErrorRecord::new("Container element missing")),
        0,
        &ErrorContext::for_placement("DAN-a", 3),
    );

    assert_eq!(decision.error_type, ErrorCategory::Dom);
    assert_eq!(decision.strategy, RecoveryStrategy::DomReset);
    assert!(decision.should_retry);
    assert!(!decision.fallback_required);
    assert_eq!(decision.retry_delay, Duration::from_millis(500));
    assert_eq!(
        decision.recovery_plan.actions,
        vec![
            RecoveryAction::RemoveMarker,
            RecoveryAction::ClearContainer,
            RecoveryAction::WaitBackoff,
            RecoveryAction::RetryLoad,
        ]
    );

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["errorType"], "DOM_ERROR");
    assert_eq!(json["retryDelay"], 500);
    assert_eq!(json["fallbackRequired"], false);
}
