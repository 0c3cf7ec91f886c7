//! Transport statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Frames sent.
    frames_sent: AtomicU64,
    /// Payload bytes sent.
    bytes_sent: AtomicU64,
    /// Frames received, close frames included.
    frames_received: AtomicU64,
    /// Payload bytes received.
    bytes_received: AtomicU64,
    /// Close frames received.
    closes_received: AtomicU64,
    /// Close handshakes initiated.
    closes_sent: AtomicU64,
    /// Native faults surfaced to callers.
    native_errors: AtomicU64,
    /// Protocol faults surfaced to callers.
    protocol_errors: AtomicU64,
    /// Operations abandoned because the context was cancelled.
    cancellations: AtomicU64,
    /// Cancelled close completions that were ignored.
    close_cancellations_ignored: AtomicU64,
}

impl TransportStats {
    /// Record a frame sent.
    pub(crate) fn frame_sent(&self, size: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Record a frame received.
    pub(crate) fn frame_received(&self, size: usize, close: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(size as u64, Ordering::Relaxed);
        if close {
            self.closes_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn close_sent(&self) {
        self.closes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn native_error(&self) {
        self.native_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancelled(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn close_cancellation_ignored(&self) {
        self.close_cancellations_ignored
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            closes_received: self.closes_received.load(Ordering::Relaxed),
            closes_sent: self.closes_sent.load(Ordering::Relaxed),
            native_errors: self.native_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            close_cancellations_ignored: self.close_cancellations_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub closes_received: u64,
    pub closes_sent: u64,
    pub native_errors: u64,
    pub protocol_errors: u64,
    pub cancellations: u64,
    pub close_cancellations_ignored: u64,
}
