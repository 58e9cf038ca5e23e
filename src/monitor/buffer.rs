//! Bounded, time-ordered metric buffers

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;

/// Kind of sample kept by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Milliseconds from load start to load end
    LoadTime,
    /// Heap change across one attempt, in bytes
    MemoryDelta,
    /// Sampled heap usage, in bytes
    MemoryUsage,
    /// Sampled number of tracked sessions
    ActiveSessions,
    /// Retry count at the end of an attempt
    RetryCount,
}

impl MetricKind {
    /// Every kind
    pub const ALL: [MetricKind; 5] = [
        MetricKind::LoadTime,
        MetricKind::MemoryDelta,
        MetricKind::MemoryUsage,
        MetricKind::ActiveSessions,
        MetricKind::RetryCount,
    ];
}

/// One sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// When it was taken
    pub at: Instant,
    /// Value
    pub value: f64,
}

/// FIFO buffer that never exceeds its capacity
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    capacity: usize,
    samples: VecDeque<MetricSample>,
}

impl MetricBuffer {
    /// Buffer holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, at: Instant, value: f64) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(MetricSample { at, value });
    }

    /// Drop samples taken before `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&mut self, cutoff: Instant) -> usize {
        let before = self.samples.len();
        // Samples are appended in time order
        while self.samples.front().is_some_and(|s| s.at < cutoff) {
            self.samples.pop_front();
        }
        before - self.samples.len()
    }

    /// Mean value, `None` when empty
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.value).sum::<f64>() / self.samples.len() as f64)
    }

    /// Largest value, `None` when empty
    pub fn max(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.value).reduce(f64::max)
    }

    /// Newest sample
    pub fn latest(&self) -> Option<MetricSample> {
        self.samples.back().copied()
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
