//! Transport statistics tracking.
//!
//! Counts datagrams in each direction, exhausted waits and stale datagrams
//! discarded before a send.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe transport statistics
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Datagrams sent
    sent: AtomicU64,
    /// Datagrams accepted as responses
    received: AtomicU64,
    /// Attempts that ended without a usable response
    timeouts: AtomicU64,
    /// Stale datagrams drained before sending
    stale_dropped: AtomicU64,
    /// Bytes sent
    bytes_out: AtomicU64,
    /// Bytes received
    bytes_in: AtomicU64,
}

impl TransportStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outgoing datagram
    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record an accepted response
    pub fn record_received(&self, bytes: usize) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record an attempt that produced nothing usable
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drained stale datagram
    pub fn record_stale(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get datagrams sent
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Get responses accepted
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Get failed attempts
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Get stale datagrams dropped
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    /// Get summary as JSON-compatible struct
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            sent: self.sent(),
            received: self.received(),
            timeouts: self.timeouts(),
            stale_dropped: self.stale_dropped(),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.received.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.stale_dropped.store(0, Ordering::Relaxed);
        self.bytes_out.store(0, Ordering::Relaxed);
        self.bytes_in.store(0, Ordering::Relaxed);
    }
}

/// Statistics summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    /// Datagrams sent
    pub sent: u64,
    /// Responses accepted
    pub received: u64,
    /// Failed attempts
    pub timeouts: u64,
    /// Stale datagrams dropped
    pub stale_dropped: u64,
    /// Bytes sent
    pub bytes_out: u64,
    /// Bytes received
    pub bytes_in: u64,
}
