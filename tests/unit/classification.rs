//! Keyword classification through the public API

use adslot_resilience::recovery::{assess_error_severity, categorize_error, ErrorRecord};
use adslot_resilience::{ErrorCategory, ErrorSeverity};

fn classify(message: &str) -> ErrorCategory {
    categorize_error(Some(&ErrorRecord::new(message)))
}

#[test]
fn test_priority_order_is_respected() {
    assert_eq!(classify("script network timeout"), ErrorCategory::ScriptLoad);
    assert_eq!(classify("script network failure"), ErrorCategory::ScriptLoad);
    assert_eq!(classify("Request timed out over network"), ErrorCategory::Timeout);
    assert_eq!(classify("fetch blocked by CORS"), ErrorCategory::Network);
    assert_eq!(classify("Container node detached"), ErrorCategory::Dom);
    assert_eq!(classify("layout shift broke display"), ErrorCategory::AdRender);
    assert_eq!(classify("required field missing"), ErrorCategory::Validation);
}

#[test]
fn test_matching_is_case_insensitive() {
    assert_eq!(classify("SCRIPT LOAD FAILED"), ErrorCategory::ScriptLoad);
    assert_eq!(classify("GET /ads.js 404"), ErrorCategory::ScriptLoad);
    assert_eq!(classify("TimeOut"), ErrorCategory::Timeout);
}

#[test]
fn test_missing_or_empty_errors_are_unknown() {
    assert_eq!(categorize_error(None), ErrorCategory::Unknown);
    assert_eq!(classify(""), ErrorCategory::Unknown);
    assert_eq!(classify("   "), ErrorCategory::Unknown);
    assert_eq!(classify("something odd happened"), ErrorCategory::Unknown);
}

#[test]
fn test_stack_text_is_searched() {
    let record = ErrorRecord::new("Unexpected failure").with_stack("at HTMLElement.appendChild");
    assert_eq!(categorize_error(Some(&record)), ErrorCategory::Dom);
}

#[test]
fn test_classification_is_deterministic() {
    let record = ErrorRecord::new("net::ERR_BLOCKED_BY_CLIENT");
    let first = categorize_error(Some(&record));
    for _ in 0..10 {
        assert_eq!(categorize_error(Some(&record)), first);
    }
    assert_eq!(first, ErrorCategory::Network);
}

#[test]
fn test_exhausted_retries_are_critical() {
    for category in ErrorCategory::ALL {
        assert_eq!(assess_error_severity(category, 3, 3), ErrorSeverity::Critical);
        assert_eq!(assess_error_severity(category, 5, 3), ErrorSeverity::Critical);
    }
    assert_eq!(
        assess_error_severity(ErrorCategory::Network, 0, 3),
        ErrorSeverity::Low
    );
}
