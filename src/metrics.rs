//! Production observability metrics for ad slot loading
//!
//! Counters, histograms and gauges for load attempts, failures by category,
//! retry backoff, fallbacks, heap usage and active sessions.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (e.g. :9090/metrics)
//! - Without an installed recorder every call is a no-op

use crate::{ErrorCategory, RecoveryStrategy};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Session ID generator for span correlation
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not bind or install
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Initialize metrics system with Prometheus exporter
///
/// Call once at startup. Later calls are no-ops.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_counter!(
        "ad_load_attempts_total",
        Unit::Count,
        "Total number of ad load attempts, retries included"
    );

    describe_counter!(
        "ad_load_success_total",
        Unit::Count,
        "Total number of attempts that rendered a creative"
    );

    describe_counter!(
        "ad_load_errors_total",
        Unit::Count,
        "Total number of failed attempts by error category"
    );

    describe_counter!(
        "ad_retries_total",
        Unit::Count,
        "Total number of retries by recovery strategy"
    );

    describe_counter!(
        "ad_fallbacks_total",
        Unit::Count,
        "Total number of sessions that ended in the static fallback"
    );

    describe_histogram!(
        "ad_load_duration_seconds",
        Unit::Seconds,
        "Time from load start to verified render"
    );

    describe_histogram!(
        "ad_retry_backoff_seconds",
        Unit::Seconds,
        "Backoff waited before a retry"
    );

    describe_gauge!(
        "ad_memory_used_bytes",
        Unit::Bytes,
        "Heap usage at the last monitor sample"
    );

    describe_gauge!(
        "ad_active_sessions",
        Unit::Count,
        "Load sessions currently tracked by the monitor"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new session ID for span correlation
pub fn next_session_id() -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("sess-{id:08x}")
}

/// Record the start of one load attempt
pub fn record_load_attempt(placement_id: &str) {
    counter!(
        "ad_load_attempts_total",
        "placement_id" => placement_id.to_string(),
    )
    .increment(1);
}

/// Record a verified render and its load time
pub fn record_load_success(placement_id: &str, load_time: Duration) {
    counter!(
        "ad_load_success_total",
        "placement_id" => placement_id.to_string(),
    )
    .increment(1);

    histogram!("ad_load_duration_seconds").record(load_time.as_secs_f64());
}

/// Record a failed attempt
pub fn record_load_error(category: ErrorCategory) {
    counter!(
        "ad_load_errors_total",
        "category" => category.as_str(),
    )
    .increment(1);
}

/// Record a retry and the backoff waited before it
pub fn record_retry_backoff(strategy: RecoveryStrategy, delay: Duration, attempt: u32) {
    counter!(
        "ad_retries_total",
        "strategy" => strategy.as_str(),
    )
    .increment(1);

    histogram!(
        "ad_retry_backoff_seconds",
        "strategy" => strategy.as_str(),
    )
    .record(delay.as_secs_f64());

    debug!(
        attempt = attempt,
        strategy = %strategy,
        backoff_ms = delay.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record a session ending in fallback
pub fn record_fallback(placement_id: &str) {
    counter!(
        "ad_fallbacks_total",
        "placement_id" => placement_id.to_string(),
    )
    .increment(1);
}

/// Record sampled heap usage
pub fn record_memory_usage(bytes: u64) {
    gauge!("ad_memory_used_bytes").set(bytes as f64);
}

/// Record the number of tracked sessions
pub fn record_active_sessions(count: usize) {
    gauge!("ad_active_sessions").set(count as f64);
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
