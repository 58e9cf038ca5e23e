//! JSON and CSV export of log entries

use super::entry::LogEntry;
use csv::Writer;
use serde::Serialize;

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON serialization failed
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// CSV write failed
    #[error("CSV error: {0}")]
    CsvError(String),
}

/// CSV row: `timestamp,level,message,eventType,placementId`
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    timestamp: String,
    level: String,
    message: &'a str,
    #[serde(rename = "eventType")]
    event_type: &'a str,
    #[serde(rename = "placementId")]
    placement_id: &'a str,
}

impl<'a> From<&'a LogEntry> for LogRecord<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        Self {
            timestamp: entry.timestamp.to_rfc3339(),
            level: entry.level.to_string(),
            message: &entry.message,
            event_type: entry.event_type().unwrap_or_default(),
            placement_id: entry.placement_id().unwrap_or_default(),
        }
    }
}

/// Pretty-printed JSON array of `{level,message,data,timestamp,id}`
pub fn export_json(entries: &[LogEntry]) -> Result<String, ExportError> {
    serde_json::to_string_pretty(entries).map_err(|e| ExportError::SerializationError(e.to_string()))
}

/// CSV with a header row, one line per entry
pub fn export_csv(entries: &[LogEntry]) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());
    if entries.is_empty() {
        writer
            .write_record(["timestamp", "level", "message", "eventType", "placementId"])
            .map_err(|e| ExportError::CsvError(e.to_string()))?;
    }
    for entry in entries {
        writer
            .serialize(LogRecord::from(entry))
            .map_err(|e| ExportError::CsvError(format!("Failed to write entry: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::CsvError(format!("Failed to flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ExportError::CsvError(e.to_string()))
}
