//! Ad event logger with a bounded ring buffer and running load metrics

use super::entry::{EventType, LogEntry, LogFilter, LogLevel};
use super::export::{self, ExportError};
use super::store::KeyValueStore;
use crate::{metrics, ErrorCategory, LoadingState, RecoveryStrategy};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default ring buffer capacity
pub const DEFAULT_MAX_LOGS: usize = 1000;

/// Default key of the persisted debug trail
pub const DEFAULT_PERSIST_KEY: &str = "adslot_debug_logs";

/// Default number of entries kept in the persisted trail
pub const DEFAULT_PERSIST_CAP: usize = 100;

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Entries below this level are dropped (metrics still update)
    pub min_level: LogLevel,
    /// Ring buffer capacity
    pub max_logs: usize,
    /// Echo accepted entries through `tracing`
    pub console: bool,
    /// Append accepted entries to the key-value store
    pub persist: bool,
    /// Store key of the persisted trail
    pub persist_key: String,
    /// Entries kept in the persisted trail
    pub persist_cap: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            max_logs: DEFAULT_MAX_LOGS,
            console: true,
            persist: false,
            persist_key: DEFAULT_PERSIST_KEY.to_string(),
            persist_cap: DEFAULT_PERSIST_CAP,
        }
    }
}

impl LoggerConfig {
    /// Set the minimum level
    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }

    /// Set the ring buffer capacity
    pub fn with_max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = max_logs;
        self
    }

    /// Enable or disable the tracing echo
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Enable or disable the persisted trail
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Set the persisted trail cap
    pub fn with_persist_cap(mut self, persist_cap: usize) -> Self {
        self.persist_cap = persist_cap;
        self
    }
}

/// Aggregate load metrics with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Attempts started, retries included
    pub total_attempts: u64,
    /// Attempts that rendered
    pub success_count: u64,
    /// Attempts that failed
    pub error_count: u64,
    /// Retries scheduled
    pub retry_count: u64,
    /// Running mean of successful load times in milliseconds
    pub average_load_time: f64,
    /// Failures per category
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    /// `successCount / totalAttempts` as a percentage
    pub success_rate: String,
    /// `errorCount / totalAttempts` as a percentage
    pub error_rate: String,
}

#[derive(Debug, Default)]
struct LoadMetrics {
    total_attempts: u64,
    success_count: u64,
    error_count: u64,
    retry_count: u64,
    average_load_time: f64,
    errors_by_category: BTreeMap<ErrorCategory, u64>,
}

impl LoadMetrics {
    fn record_success(&mut self, load_time_ms: f64) {
        // The counter moves first; the mean below divides by the new count
        self.success_count += 1;
        let n = self.success_count as f64;
        self.average_load_time = (self.average_load_time * (n - 1.0) + load_time_ms) / n;
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_attempts: self.total_attempts,
            success_count: self.success_count,
            error_count: self.error_count,
            retry_count: self.retry_count,
            average_load_time: self.average_load_time,
            errors_by_category: self.errors_by_category.clone(),
            success_rate: rate(self.success_count, self.total_attempts),
            error_rate: rate(self.error_count, self.total_attempts),
        }
    }
}

fn rate(count: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", count as f64 / total as f64 * 100.0)
}

/// Structured ad event logger. Every call is infallible.
pub struct AdLogger {
    config: LoggerConfig,
    entries: Mutex<VecDeque<LogEntry>>,
    metrics: Mutex<LoadMetrics>,
    next_id: AtomicU64,
    store: Option<Arc<dyn KeyValueStore>>,
    // Serializes the trail's read-modify-write
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for AdLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdLogger")
            .field("config", &self.config)
            .field("entries", &self.entries.lock().len())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Default for AdLogger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

impl AdLogger {
    /// Create a logger without a persisted trail
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(config.max_logs.min(DEFAULT_MAX_LOGS))),
            config,
            metrics: Mutex::new(LoadMetrics::default()),
            next_id: AtomicU64::new(0),
            store: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Attach a store for the persisted trail
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Logger configuration
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Record one event. Dropped when below the minimum level.
    pub fn log(
        &self,
        level: LogLevel,
        event_type: EventType,
        placement_id: &str,
        message: impl Into<String>,
        extra: Value,
    ) {
        if level < self.config.min_level || self.config.max_logs == 0 {
            return;
        }

        let mut data = json!({
            "eventType": event_type.as_str(),
            "placementId": placement_id,
        });
        if let (Value::Object(target), Value::Object(fields)) = (&mut data, extra) {
            for (key, value) in fields {
                target.entry(key).or_insert(value);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = LogEntry {
            level,
            message: message.into(),
            data,
            timestamp: Utc::now(),
            id: format!("log-{id:08x}"),
        };

        if self.config.console {
            echo(&entry, event_type, placement_id);
        }
        if self.config.persist {
            self.persist(&entry);
        }

        let mut entries = self.entries.lock();
        while entries.len() >= self.config.max_logs {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn persist(&self, entry: &LogEntry) {
        let Some(store) = &self.store else {
            return;
        };
        let key = &self.config.persist_key;
        let _guard = self.persist_lock.lock();

        let mut trail: Vec<LogEntry> = match store.get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::debug!(error = %e, "Persisted trail unreadable, starting over");
                Vec::new()
            }
        };
        trail.push(entry.clone());
        if trail.len() > self.config.persist_cap {
            let excess = trail.len() - self.config.persist_cap;
            trail.drain(..excess);
        }

        match serde_json::to_string(&trail) {
            Ok(raw) => {
                if let Err(e) = store.set(key, &raw) {
                    tracing::debug!(error = %e, "Failed to persist log trail");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Failed to serialize log trail"),
        }
    }

    /// Entries currently in the persisted trail
    pub fn persisted_logs(&self) -> Vec<LogEntry> {
        self.store
            .as_ref()
            .and_then(|store| store.get(&self.config.persist_key).ok().flatten())
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Attempt started
    pub fn log_load_start(&self, placement_id: &str, retry_count: u32) {
        self.metrics.lock().total_attempts += 1;
        metrics::record_load_attempt(placement_id);
        self.log(
            LogLevel::Info,
            EventType::LoadStart,
            placement_id,
            "Ad load started",
            json!({ "retryCount": retry_count }),
        );
    }

    /// Creative rendered after `load_time`
    pub fn log_load_success(&self, placement_id: &str, load_time: Duration, retry_count: u32) {
        let load_time_ms = load_time.as_secs_f64() * 1000.0;
        self.metrics.lock().record_success(load_time_ms);
        metrics::record_load_success(placement_id, load_time);
        self.log(
            LogLevel::Info,
            EventType::LoadSuccess,
            placement_id,
            "Ad loaded successfully",
            json!({ "loadTime": load_time_ms, "retryCount": retry_count }),
        );
    }

    /// Attempt failed
    pub fn log_load_error(
        &self,
        placement_id: &str,
        error: &str,
        category: ErrorCategory,
        retry_count: u32,
    ) {
        {
            let mut metrics = self.metrics.lock();
            metrics.error_count += 1;
            *metrics.errors_by_category.entry(category).or_insert(0) += 1;
        }
        metrics::record_load_error(category);
        self.log(
            LogLevel::Error,
            EventType::LoadError,
            placement_id,
            format!("Ad load failed: {error}"),
            json!({
                "error": error,
                "errorType": category.as_str(),
                "retryCount": retry_count,
            }),
        );
    }

    /// Retry scheduled
    pub fn log_retry(
        &self,
        placement_id: &str,
        retry_count: u32,
        strategy: RecoveryStrategy,
        delay: Duration,
    ) {
        self.metrics.lock().retry_count += 1;
        self.log(
            LogLevel::Warn,
            EventType::Retry,
            placement_id,
            format!("Retrying ad load (attempt {retry_count})"),
            json!({
                "retryCount": retry_count,
                "strategy": strategy.as_str(),
                "delay": delay.as_millis() as u64,
            }),
        );
    }

    /// Attempt exceeded its budget
    pub fn log_timeout(&self, placement_id: &str, timeout: Duration, retry_count: u32) {
        self.log(
            LogLevel::Warn,
            EventType::Timeout,
            placement_id,
            format!("Ad load timed out after {}ms", timeout.as_millis()),
            json!({ "timeout": timeout.as_millis() as u64, "retryCount": retry_count }),
        );
    }

    /// Session ended in fallback
    pub fn log_fallback(&self, placement_id: &str, reason: &str, retry_count: u32) {
        metrics::record_fallback(placement_id);
        self.log(
            LogLevel::Warn,
            EventType::Fallback,
            placement_id,
            "Showing fallback placeholder",
            json!({ "reason": reason, "retryCount": retry_count }),
        );
    }

    /// Network script load result
    pub fn log_script_load(&self, placement_id: &str, url: &str, success: bool, detail: &str) {
        let level = if success { LogLevel::Debug } else { LogLevel::Error };
        self.log(
            level,
            EventType::ScriptLoad,
            placement_id,
            if success {
                "Ad script ready"
            } else {
                "Ad script failed"
            },
            json!({ "url": url, "success": success, "detail": detail }),
        );
    }

    /// Render verification result
    pub fn log_render(&self, placement_id: &str, rendered: bool, checks: u32) {
        self.log(
            if rendered { LogLevel::Debug } else { LogLevel::Warn },
            EventType::Render,
            placement_id,
            if rendered {
                "Creative render verified"
            } else {
                "Creative did not render"
            },
            json!({ "rendered": rendered, "checks": checks }),
        );
    }

    /// Input validation result
    pub fn log_validation(&self, placement_id: &str, valid: bool, detail: &str) {
        self.log(
            if valid { LogLevel::Debug } else { LogLevel::Warn },
            EventType::Validation,
            placement_id,
            if valid {
                "Container validated"
            } else {
                "Container validation failed"
            },
            json!({ "valid": valid, "detail": detail }),
        );
    }

    /// State machine transition
    pub fn log_state_change(
        &self,
        placement_id: &str,
        old_state: LoadingState,
        new_state: LoadingState,
        retry_count: u32,
    ) {
        self.log(
            LogLevel::Debug,
            EventType::StateChange,
            placement_id,
            format!("State {old_state} -> {new_state}"),
            json!({
                "oldState": old_state,
                "newState": new_state,
                "retryCount": retry_count,
            }),
        );
    }

    /// Recovery action executed
    pub fn log_recovery(&self, placement_id: &str, strategy: RecoveryStrategy, action: &str) {
        self.log(
            LogLevel::Info,
            EventType::Recovery,
            placement_id,
            format!("Recovery action {action}"),
            json!({ "strategy": strategy.as_str(), "action": action }),
        );
    }

    /// All buffered entries, oldest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Buffered entries matching `filter`
    pub fn filter(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// The newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Metrics snapshot with derived rates
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.lock().snapshot()
    }

    /// Drop all buffered entries (metrics are kept)
    pub fn clear_logs(&self) {
        self.entries.lock().clear();
    }

    /// Zero all metric counters
    pub fn reset_metrics(&self) {
        *self.metrics.lock() = LoadMetrics::default();
    }

    /// Export the buffer as a JSON array
    pub fn export_json(&self) -> Result<String, ExportError> {
        export::export_json(&self.logs())
    }

    /// Export the buffer as CSV
    pub fn export_csv(&self) -> Result<String, ExportError> {
        export::export_csv(&self.logs())
    }
}

fn echo(entry: &LogEntry, event_type: EventType, placement_id: &str) {
    let event = event_type.as_str();
    match entry.level {
        LogLevel::Debug => {
            tracing::debug!(placement_id, event, id = %entry.id, "{}", entry.message)
        }
        LogLevel::Info => {
            tracing::info!(placement_id, event, id = %entry.id, "{}", entry.message)
        }
        LogLevel::Warn => {
            tracing::warn!(placement_id, event, id = %entry.id, "{}", entry.message)
        }
        LogLevel::Error => {
            tracing::error!(placement_id, event, id = %entry.id, "{}", entry.message)
        }
    }
}
