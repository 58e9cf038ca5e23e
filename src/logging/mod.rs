//! Structured ad event logging
//!
//! [`AdLogger`] keeps a bounded ring buffer of [`LogEntry`] values plus running
//! load metrics. Entries can be echoed through `tracing`, appended to a
//! persisted trail in a [`KeyValueStore`], queried with a [`LogFilter`] and
//! exported as JSON or CSV.

pub mod entry;
pub mod export;
pub mod logger;
pub mod store;

pub use entry::{EventType, LogEntry, LogFilter, LogLevel};
pub use export::{export_csv, export_json, ExportError};
pub use logger::{AdLogger, LoggerConfig, MetricsSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
