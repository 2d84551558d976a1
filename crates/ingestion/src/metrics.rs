//! Link counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-link counters
///
/// Atomics back the in-process snapshot; the same events are mirrored to the
/// `metrics` facade with a `link` label.
#[derive(Debug)]
pub struct LinkMetrics {
    link: &'static str,

    /// Non-empty lines received
    pub lines_received: AtomicU64,

    /// Lines that produced a fix or reading
    pub records_decoded: AtomicU64,

    /// Lines rejected by the decoder
    pub parse_errors: AtomicU64,

    /// Read failures other than timeouts
    pub io_errors: AtomicU64,
}

impl LinkMetrics {
    pub fn new(link: &'static str) -> Self {
        Self {
            link,
            lines_received: AtomicU64::new(0),
            records_decoded: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
        }
    }

    pub fn record_line(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("srvs_link_lines_total", "link" => self.link).increment(1);
    }

    pub fn record_decoded(&self) {
        self.records_decoded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("srvs_link_records_total", "link" => self.link).increment(1);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("srvs_link_parse_errors_total", "link" => self.link).increment(1);
    }

    pub fn record_io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("srvs_link_io_errors_total", "link" => self.link).increment(1);
    }

    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkMetricsSnapshot {
    pub lines_received: u64,
    pub records_decoded: u64,
    pub parse_errors: u64,
    pub io_errors: u64,
}
