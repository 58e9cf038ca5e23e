//! Heap memory probes

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of heap usage readings
pub trait MemoryProbe: Send + Sync {
    /// Current heap usage in bytes, `None` when the host exposes no memory API
    fn used_heap_bytes(&self) -> Option<u64>;

    /// Ask the host to collect garbage. Returns whether the hint was accepted.
    fn request_gc(&self) -> bool {
        false
    }
}

/// Host without a memory API; every reading is unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryApi;

impl MemoryProbe for NoMemoryApi {
    fn used_heap_bytes(&self) -> Option<u64> {
        None
    }
}

/// Settable probe for simulation and tests
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    used: Mutex<Option<u64>>,
    gc_supported: bool,
    gc_requests: AtomicU64,
}

impl FixedMemoryProbe {
    /// Probe reporting `bytes`
    pub fn new(bytes: u64) -> Self {
        Self {
            used: Mutex::new(Some(bytes)),
            ..Self::default()
        }
    }

    /// Accept GC hints
    pub fn with_gc(mut self) -> Self {
        self.gc_supported = true;
        self
    }

    /// Change the reported usage
    pub fn set(&self, bytes: u64) {
        *self.used.lock() = Some(bytes);
    }

    /// Report the memory API as unavailable
    pub fn clear(&self) {
        *self.used.lock() = None;
    }

    /// GC hints received so far
    pub fn gc_requests(&self) -> u64 {
        self.gc_requests.load(Ordering::Relaxed)
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn used_heap_bytes(&self) -> Option<u64> {
        *self.used.lock()
    }

    fn request_gc(&self) -> bool {
        if self.gc_supported {
            self.gc_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.gc_supported
    }
}

/// Resident set size of the current process, read from `/proc/self/statm`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemoryProbe;

/// Page size assumed when converting statm pages to bytes
const PAGE_SIZE: u64 = 4096;

impl ProcessMemoryProbe {
    fn parse_statm(contents: &str) -> Option<u64> {
        contents
            .split_whitespace()
            .nth(1)
            .and_then(|pages| pages.parse::<u64>().ok())
            .map(|pages| pages * PAGE_SIZE)
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn used_heap_bytes(&self) -> Option<u64> {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .as_deref()
            .and_then(Self::parse_statm)
    }
}
