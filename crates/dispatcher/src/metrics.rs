//! Per-sink counters
//!
//! Shared between the producer side (drops, queue depth) and the worker
//! (writes, failures). Prometheus gets the same events through
//! `observability`; these exist so a session can report them at the end.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SinkCounters {
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl SinkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the queue depth seen by a producer or the worker
    pub fn observe_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn on_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the drop count including this one
    pub fn on_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SinkStats {
        SinkStats {
            depth: self.depth.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

/// Point-in-time copy of [`SinkCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub depth: usize,
    pub peak_depth: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl SinkStats {
    /// Every record offered to the sink made it to disk
    pub fn is_lossless(&self) -> bool {
        self.failed == 0 && self.dropped == 0
    }
}

impl fmt::Display for SinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} failed={} dropped={} peak_queue={}",
            self.written, self.failed, self.dropped, self.peak_depth
        )
    }
}
