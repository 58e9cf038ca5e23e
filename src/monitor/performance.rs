//! Performance monitor: per-attempt timing and memory, periodic sampling,
//! leak detection and threshold-triggered cleanup.

use super::buffer::{MetricBuffer, MetricKind};
use super::memory::{MemoryProbe, NoMemoryApi};
use super::report::{recommendations_for, MemoryReport, PerformanceReport};
use crate::config::duration_millis;
use crate::metrics;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default sampling period
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Default heap threshold (50 MiB)
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Default capacity of each metric buffer
pub const DEFAULT_MAX_SAMPLES: usize = 100;

/// Age after which a tracked session is a leak suspect
pub const DEFAULT_LEAK_AGE: Duration = Duration::from_secs(5 * 60);

/// Age after which samples are pruned on memory pressure
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Period of the background sampler
    #[serde(with = "duration_millis")]
    pub sample_interval: Duration,
    /// Heap usage that triggers cleanup, in bytes
    pub memory_threshold: u64,
    /// Capacity of each metric buffer
    pub max_samples: usize,
    /// Tracked sessions older than this are leak suspects
    #[serde(with = "duration_millis")]
    pub leak_age: Duration,
    /// Samples older than this are pruned on memory pressure
    #[serde(with = "duration_millis")]
    pub retention: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_samples: DEFAULT_MAX_SAMPLES,
            leak_age: DEFAULT_LEAK_AGE,
            retention: DEFAULT_RETENTION,
        }
    }
}

impl MonitorConfig {
    /// Set the sampling period
    pub fn with_sample_interval(mut self, sample_interval: Duration) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    /// Set the heap threshold
    pub fn with_memory_threshold(mut self, memory_threshold: u64) -> Self {
        self.memory_threshold = memory_threshold;
        self
    }

    /// Set the buffer capacity
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Set the leak age
    pub fn with_leak_age(mut self, leak_age: Duration) -> Self {
        self.leak_age = leak_age;
        self
    }
}

/// Timing and memory of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceRecord {
    /// Placement measured
    pub placement_id: String,
    /// Attempt start
    pub start_time: Instant,
    /// Heap at start (0 when unavailable)
    pub memory_before: u64,
    /// Attempt end
    pub end_time: Option<Instant>,
    /// Heap at end (0 when unavailable)
    pub memory_after: u64,
    /// `memory_after - memory_before`
    pub memory_delta: i64,
    /// Outcome
    pub success: bool,
}

/// Result of closing one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMeasurement {
    /// Time between start and end
    pub load_time: Duration,
    /// Heap change in bytes
    pub memory_delta: i64,
    /// Outcome
    pub success: bool,
}

/// Session evicted as a leak suspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakSuspect {
    /// Placement that was tracked
    pub placement_id: String,
    /// How long it had been tracked
    pub age: Duration,
}

/// Result of a threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCheck {
    /// Usage read (0 when unavailable)
    pub used_bytes: u64,
    /// Whether usage exceeded the threshold
    pub exceeded: bool,
    /// Samples pruned as a result
    pub pruned: usize,
    /// Whether a GC hint was accepted
    pub gc_requested: bool,
}

#[derive(Debug)]
struct MonitorState {
    active: HashMap<String, PerformanceRecord>,
    buffers: HashMap<MetricKind, MetricBuffer>,
    total_loads: u64,
    successful_loads: u64,
    peak_memory: u64,
    leak_suspects: VecDeque<String>,
    leaks_detected: u64,
    max_samples: usize,
}

impl MonitorState {
    fn new(max_samples: usize) -> Self {
        Self {
            active: HashMap::new(),
            buffers: MetricKind::ALL
                .into_iter()
                .map(|kind| (kind, MetricBuffer::new(max_samples)))
                .collect(),
            total_loads: 0,
            successful_loads: 0,
            peak_memory: 0,
            leak_suspects: VecDeque::new(),
            leaks_detected: 0,
            max_samples,
        }
    }

    /// Remember a leak suspect, dropping the oldest beyond `max_samples`.
    fn note_leak(&mut self, placement_id: String) {
        self.leaks_detected += 1;
        if self.max_samples == 0 {
            return;
        }
        while self.leak_suspects.len() >= self.max_samples {
            self.leak_suspects.pop_front();
        }
        self.leak_suspects.push_back(placement_id);
    }

    fn push(&mut self, kind: MetricKind, at: Instant, value: f64) {
        if let Some(buffer) = self.buffers.get_mut(&kind) {
            buffer.push(at, value);
        }
    }

    fn buffer(&self, kind: MetricKind) -> Option<&MetricBuffer> {
        self.buffers.get(&kind)
    }
}

/// Independent performance and leak monitor, shared across sessions.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    probe: Arc<dyn MemoryProbe>,
    state: Mutex<MonitorState>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("active_sessions", &self.active_sessions())
            .finish()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    /// Monitor without a memory API
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_probe(config, Arc::new(NoMemoryApi))
    }

    /// Monitor reading heap usage from `probe`
    pub fn with_probe(config: MonitorConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            state: Mutex::new(MonitorState::new(config.max_samples)),
            config,
            probe,
        }
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn memory_now(&self) -> u64 {
        self.probe.used_heap_bytes().unwrap_or(0)
    }

    /// Open an attempt for `placement_id`, replacing any unfinished one.
    pub fn record_load_start(&self, placement_id: &str) {
        let record = PerformanceRecord {
            placement_id: placement_id.to_string(),
            start_time: Instant::now(),
            memory_before: self.memory_now(),
            end_time: None,
            memory_after: 0,
            memory_delta: 0,
            success: false,
        };

        let active = {
            let mut state = self.state.lock();
            state.active.insert(placement_id.to_string(), record);
            state.active.len()
        };
        metrics::record_active_sessions(active);
        debug!(placement_id, active_sessions = active, "Load measurement started");
    }

    /// Close the attempt for `placement_id`.
    ///
    /// Returns `None` if no attempt was open (already closed, discarded or
    /// evicted as a leak suspect).
    pub fn record_load_end(
        &self,
        placement_id: &str,
        success: bool,
        retry_count: u32,
    ) -> Option<LoadMeasurement> {
        let now = Instant::now();
        let memory_after = self.memory_now();

        let (measurement, active) = {
            let mut state = self.state.lock();
            let mut record = state.active.remove(placement_id)?;
            record.end_time = Some(now);
            record.memory_after = memory_after;
            record.memory_delta = memory_after as i64 - record.memory_before as i64;
            record.success = success;

            let load_time = now.saturating_duration_since(record.start_time);
            state.push(MetricKind::LoadTime, now, load_time.as_secs_f64() * 1000.0);
            state.push(MetricKind::MemoryDelta, now, record.memory_delta as f64);
            state.push(MetricKind::RetryCount, now, retry_count as f64);
            state.total_loads += 1;
            if success {
                state.successful_loads += 1;
            }

            (
                LoadMeasurement {
                    load_time,
                    memory_delta: record.memory_delta,
                    success,
                },
                state.active.len(),
            )
        };

        metrics::record_active_sessions(active);
        debug!(
            placement_id,
            success,
            load_time_ms = measurement.load_time.as_millis() as u64,
            memory_delta = measurement.memory_delta,
            "Load measurement finished"
        );
        Some(measurement)
    }

    /// Stop tracking `placement_id` without recording a measurement.
    pub fn discard_session(&self, placement_id: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.active.remove(placement_id).is_some();
        metrics::record_active_sessions(state.active.len());
        removed
    }

    /// Sessions currently tracked
    pub fn active_sessions(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Evict sessions tracked longer than the leak age.
    ///
    /// Only the monitor's tracking entry goes; the session itself is untouched.
    pub fn detect_memory_leaks(&self) -> Vec<LeakSuspect> {
        let now = Instant::now();
        let leak_age = self.config.leak_age;

        let suspects: Vec<LeakSuspect> = {
            let mut state = self.state.lock();
            let stale: Vec<LeakSuspect> = state
                .active
                .values()
                .filter_map(|record| {
                    let age = now.saturating_duration_since(record.start_time);
                    (age > leak_age).then(|| LeakSuspect {
                        placement_id: record.placement_id.clone(),
                        age,
                    })
                })
                .collect();
            for suspect in &stale {
                state.active.remove(&suspect.placement_id);
                state.note_leak(suspect.placement_id.clone());
            }
            stale
        };

        for suspect in &suspects {
            warn!(
                placement_id = %suspect.placement_id,
                age_secs = suspect.age.as_secs(),
                "Possible leaked load session, no longer tracking it"
            );
        }
        suspects
    }

    /// Compare heap usage to the threshold; on breach prune old samples and
    /// hint the host to collect garbage.
    pub fn check_memory_usage(&self) -> MemoryCheck {
        let used_bytes = self.memory_now();
        if used_bytes <= self.config.memory_threshold {
            return MemoryCheck {
                used_bytes,
                exceeded: false,
                pruned: 0,
                gc_requested: false,
            };
        }

        let pruned = self.prune_older_than(self.config.retention);
        let gc_requested = self.probe.request_gc();
        warn!(
            used_bytes,
            threshold = self.config.memory_threshold,
            pruned,
            gc_requested,
            "Memory usage above threshold, cleaning up"
        );
        MemoryCheck {
            used_bytes,
            exceeded: true,
            pruned,
            gc_requested,
        }
    }

    /// Drop samples older than `age` from every buffer.
    pub fn prune_older_than(&self, age: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(age) else {
            return 0;
        };
        let mut state = self.state.lock();
        state
            .buffers
            .values_mut()
            .map(|buffer| buffer.prune_older_than(cutoff))
            .sum()
    }

    /// Take one periodic sample: heap, session count, leaks, threshold.
    pub fn sample(&self) {
        let now = Instant::now();
        let memory = self.probe.used_heap_bytes();

        let active = {
            let mut state = self.state.lock();
            if let Some(bytes) = memory {
                state.push(MetricKind::MemoryUsage, now, bytes as f64);
                state.peak_memory = state.peak_memory.max(bytes);
            }
            let active = state.active.len();
            state.push(MetricKind::ActiveSessions, now, active as f64);
            active
        };

        if let Some(bytes) = memory {
            metrics::record_memory_usage(bytes);
        }
        metrics::record_active_sessions(active);

        self.detect_memory_leaks();
        self.check_memory_usage();
    }

    /// Start the periodic sampler. It stops when `token` is cancelled.
    pub fn spawn_sampler(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let period = self.config.sample_interval;
        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Performance sampler started");
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => self.sample(),
                }
            }
            info!("Performance sampler stopped");
        })
    }

    /// Buffered samples of one kind
    pub fn samples(&self, kind: MetricKind) -> Vec<f64> {
        self.state
            .lock()
            .buffer(kind)
            .map(|buffer| buffer.iter().map(|s| s.value).collect())
            .unwrap_or_default()
    }

    /// Aggregate statistics and recommendations
    pub fn generate_performance_report(&self) -> PerformanceReport {
        let memory_reading = self.probe.used_heap_bytes();
        let current_bytes = memory_reading.unwrap_or(0);

        let state = self.state.lock();
        let average = |kind| {
            state
                .buffer(kind)
                .and_then(MetricBuffer::average)
                .unwrap_or(0.0)
        };

        let success_rate = if state.total_loads == 0 {
            0.0
        } else {
            state.successful_loads as f64 / state.total_loads as f64 * 100.0
        };
        let average_load_time_ms = average(MetricKind::LoadTime);
        let average_retries = average(MetricKind::RetryCount);
        let memory = MemoryReport {
            current_bytes,
            peak_bytes: state.peak_memory.max(current_bytes),
            average_delta_bytes: average(MetricKind::MemoryDelta),
            threshold_bytes: self.config.memory_threshold,
            exceeds_threshold: current_bytes > self.config.memory_threshold,
            available: memory_reading.is_some(),
        };

        let recommendations = recommendations_for(
            state.total_loads,
            success_rate,
            average_load_time_ms,
            average_retries,
            &memory,
        );

        PerformanceReport {
            generated_at: Utc::now(),
            total_loads: state.total_loads,
            successful_loads: state.successful_loads,
            success_rate,
            average_load_time_ms,
            max_load_time_ms: state
                .buffer(MetricKind::LoadTime)
                .and_then(MetricBuffer::max)
                .unwrap_or(0.0),
            average_retries,
            active_sessions: state.active.len(),
            memory,
            leak_suspects: state.leak_suspects.iter().cloned().collect(),
            leaks_detected: state.leaks_detected,
            recommendations,
        }
    }

    /// Forget every measurement and tracked session
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::new(self.config.max_samples);
    }
}
