//! Keyword-driven error classification.
//!
//! Third-party ad scripts fail with free-form text, so the text itself is the
//! contract. Classification is a pure function over a normalised
//! [`ErrorRecord`]: message and stack are lower-cased and matched against
//! ordered keyword groups; the first group with a hit wins.

use crate::{ErrorCategory, ErrorSeverity};
use serde::{Deserialize, Serialize};

/// Ordered keyword groups. Earlier groups take priority, so
/// "script network timeout" is a script load error.
pub const KEYWORD_GROUPS: [(ErrorCategory, &[&str]); 6] = [
    (
        ErrorCategory::ScriptLoad,
        &["script", "load", "network-error", "404"],
    ),
    (ErrorCategory::Timeout, &["timeout", "timed out"]),
    (
        ErrorCategory::Network,
        &["network", "fetch", "connection", "cors", "blocked"],
    ),
    (ErrorCategory::Dom, &["dom", "element", "container", "node"]),
    (
        ErrorCategory::AdRender,
        &["render", "display", "visibility", "layout"],
    ),
    (
        ErrorCategory::Validation,
        &["validation", "invalid", "missing", "required"],
    ),
];

/// Normalised view of a raised error: what it said and where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Error message
    pub message: String,
    /// Stack or source chain, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorRecord {
    /// Create a record from a message only
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack or source chain
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a record from a Rust error, using its source chain as the stack.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            chain.push(inner.to_string());
            source = inner.source();
        }

        Self {
            message: error.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }

    /// Whether there is any text to classify
    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
            && self.stack.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    fn search_text(&self) -> String {
        let mut text = self.message.to_lowercase();
        if let Some(stack) = &self.stack {
            text.push('\n');
            text.push_str(&stack.to_lowercase());
        }
        text
    }
}

impl From<&str> for ErrorRecord {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ErrorRecord {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Map an error to its category. `None` and empty records are unknown.
pub fn categorize_error(error: Option<&ErrorRecord>) -> ErrorCategory {
    let Some(record) = error.filter(|r| !r.is_empty()) else {
        return ErrorCategory::Unknown;
    };

    let text = record.search_text();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Rank an error. Exhausted retries are always critical.
pub fn assess_error_severity(
    category: ErrorCategory,
    retry_count: u32,
    max_retries: u32,
) -> ErrorSeverity {
    if retry_count >= max_retries {
        return ErrorSeverity::Critical;
    }

    match category {
        ErrorCategory::ScriptLoad | ErrorCategory::Timeout => {
            if retry_count >= 2 {
                ErrorSeverity::High
            } else {
                ErrorSeverity::Medium
            }
        }
        ErrorCategory::Network => {
            if retry_count == 0 {
                ErrorSeverity::Low
            } else {
                ErrorSeverity::Medium
            }
        }
        ErrorCategory::Dom => ErrorSeverity::High,
        ErrorCategory::AdRender => {
            if retry_count >= 1 {
                ErrorSeverity::Medium
            } else {
                ErrorSeverity::Low
            }
        }
        ErrorCategory::Validation | ErrorCategory::Unknown => ErrorSeverity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(message: &str) -> ErrorCategory {
        categorize_error(Some(&ErrorRecord::new(message)))
    }

    #[test]
    fn test_each_group_matches() {
        assert_eq!(classify("Script load failed"), ErrorCategory::ScriptLoad);
        assert_eq!(classify("GET ba.min.js 404"), ErrorCategory::ScriptLoad);
        assert_eq!(classify("Request timed out"), ErrorCategory::Timeout);
        assert_eq!(classify("TIMEOUT"), ErrorCategory::Timeout);
        assert_eq!(
            classify("net::ERR_BLOCKED_BY_CLIENT"),
            ErrorCategory::Network
        );
        assert_eq!(classify("CORS policy violation"), ErrorCategory::Network);
        assert_eq!(classify("Container not attached"), ErrorCategory::Dom);
        assert_eq!(classify("render produced nothing"), ErrorCategory::AdRender);
        assert_eq!(classify("invalid slot id"), ErrorCategory::Validation);
        assert_eq!(classify("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(classify("script network timeout"), ErrorCategory::ScriptLoad);
        assert_eq!(classify("script network failure"), ErrorCategory::ScriptLoad);
        assert_eq!(classify("network timeout"), ErrorCategory::Timeout);
        assert_eq!(classify("invalid element"), ErrorCategory::Dom);
        assert_eq!(classify("display blocked"), ErrorCategory::Network);
    }

    #[test]
    fn test_null_and_empty_are_unknown() {
        assert_eq!(categorize_error(None), ErrorCategory::Unknown);
        assert_eq!(classify(""), ErrorCategory::Unknown);
        assert_eq!(classify("   "), ErrorCategory::Unknown);
    }

    #[test]
    fn test_stack_is_searched() {
        let record = ErrorRecord::new("Uncaught exception").with_stack("at renderSlot (ba.min.js)");
        // "ba.min.js" has no keyword; "renderSlot" does
        assert_eq!(categorize_error(Some(&record)), ErrorCategory::AdRender);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let record = ErrorRecord::new("Failed to fetch");
        let first = categorize_error(Some(&record));
        for _ in 0..10 {
            assert_eq!(categorize_error(Some(&record)), first);
        }
        assert_eq!(first, ErrorCategory::Network);
    }

    #[test]
    fn test_from_error_uses_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer failure")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::Other,
            "connection reset",
        ));
        let record = ErrorRecord::from_error(&err);
        assert_eq!(record.message, "outer failure");
        assert_eq!(record.stack.as_deref(), Some("connection reset"));
        assert_eq!(categorize_error(Some(&record)), ErrorCategory::Network);
    }

    #[test]
    fn test_severity_critical_iff_exhausted() {
        for category in ErrorCategory::ALL {
            for max_retries in 0..5 {
                for retry_count in 0..8 {
                    let severity = assess_error_severity(category, retry_count, max_retries);
                    assert_eq!(
                        severity == ErrorSeverity::Critical,
                        retry_count >= max_retries,
                        "{category} retry={retry_count} max={max_retries}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_severity_escalation() {
        use ErrorCategory::*;
        use ErrorSeverity::*;

        assert_eq!(assess_error_severity(ScriptLoad, 0, 5), Medium);
        assert_eq!(assess_error_severity(ScriptLoad, 2, 5), High);
        assert_eq!(assess_error_severity(Timeout, 1, 5), Medium);
        assert_eq!(assess_error_severity(Timeout, 3, 5), High);
        assert_eq!(assess_error_severity(Network, 0, 5), Low);
        assert_eq!(assess_error_severity(Network, 1, 5), Medium);
        assert_eq!(assess_error_severity(Dom, 0, 5), High);
        assert_eq!(assess_error_severity(AdRender, 0, 5), Low);
        assert_eq!(assess_error_severity(AdRender, 1, 5), Medium);
        assert_eq!(assess_error_severity(Validation, 0, 5), Medium);
        assert_eq!(assess_error_severity(Unknown, 4, 5), Medium);
    }
}
