//! Performance and memory leak monitoring
//!
//! The [`PerformanceMonitor`] brackets each load attempt, samples heap usage
//! and session counts on a timer, evicts leak suspects and produces
//! [`PerformanceReport`]s with rule-based recommendations.

pub mod buffer;
pub mod memory;
pub mod performance;
pub mod report;

pub use buffer::{MetricBuffer, MetricKind, MetricSample};
pub use memory::{FixedMemoryProbe, MemoryProbe, NoMemoryApi, ProcessMemoryProbe};
pub use performance::{
    LeakSuspect, LoadMeasurement, MemoryCheck, MonitorConfig, PerformanceMonitor,
    PerformanceRecord,
};
pub use report::{MemoryReport, PerformanceReport, Recommendation, RecommendationKind};
