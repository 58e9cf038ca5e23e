//! Log entries, levels and event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entry severity, ordered `Debug < Info < Warn < Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Verbose diagnostics
    Debug,
    /// Normal life-cycle events
    Info,
    /// Recoverable failures
    Warn,
    /// Failures
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// Life-cycle event carried in an entry's `data.eventType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Attempt started
    LoadStart,
    /// Creative rendered
    LoadSuccess,
    /// Attempt failed
    LoadError,
    /// Retry scheduled
    Retry,
    /// Attempt timed out
    Timeout,
    /// Session ended in fallback
    Fallback,
    /// Network script load result
    ScriptLoad,
    /// Render verification result
    Render,
    /// Input validation result
    Validation,
    /// State machine transition
    StateChange,
    /// Recovery action executed
    Recovery,
}

impl EventType {
    /// Wire name (e.g. `load_start`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LoadStart => "load_start",
            EventType::LoadSuccess => "load_success",
            EventType::LoadError => "load_error",
            EventType::Retry => "retry",
            EventType::Timeout => "timeout",
            EventType::Fallback => "fallback",
            EventType::ScriptLoad => "script_load",
            EventType::Render => "render",
            EventType::Validation => "validation",
            EventType::StateChange => "state_change",
            EventType::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Structured payload; always carries `eventType` and `placementId`
    pub data: serde_json::Value,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Unique id (`log-xxxxxxxx`)
    pub id: String,
}

impl LogEntry {
    /// Event type from the payload
    pub fn event_type(&self) -> Option<&str> {
        self.data.get("eventType").and_then(|v| v.as_str())
    }

    /// Placement id from the payload
    pub fn placement_id(&self) -> Option<&str> {
        self.data.get("placementId").and_then(|v| v.as_str())
    }
}

/// Query over the log buffer; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Minimum level
    pub level: Option<LogLevel>,
    /// Exact event type
    pub event_type: Option<EventType>,
    /// Exact placement id
    pub placement_id: Option<String>,
    /// Entries at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl LogFilter {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep entries at or above `level`
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Keep entries of one event type
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Keep entries for one placement
    pub fn with_placement_id(mut self, placement_id: impl Into<String>) -> Self {
        self.placement_id = Some(placement_id.into());
        self
    }

    /// Keep entries recorded at or after `since`
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Whether `entry` passes every set criterion
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.level.is_some_and(|level| entry.level < level) {
            return false;
        }
        if let Some(event_type) = self.event_type {
            if entry.event_type() != Some(event_type.as_str()) {
                return false;
            }
        }
        if let Some(placement_id) = &self.placement_id {
            if entry.placement_id() != Some(placement_id.as_str()) {
                return false;
            }
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        true
    }
}
