//! Per-peer counters
//!
//! Every [`Peer`](crate::peer::Peer) owns one [`PeerMetrics`] and records frame
//! traffic and failures into it. Uses atomic counters so the send path and the
//! receive loop can update it without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for a single peer's lifetime
#[derive(Debug)]
pub struct PeerMetrics {
    /// Frames written to the stream
    pub frames_sent: AtomicU64,
    /// Frames decoded from the stream
    pub frames_received: AtomicU64,
    /// Payload bytes written (length prefix excluded)
    pub bytes_sent: AtomicU64,
    /// Payload bytes decoded (length prefix excluded)
    pub bytes_received: AtomicU64,
    /// Packets dropped on send for exceeding the maximum frame size
    pub oversized_dropped: AtomicU64,
    /// Sends that failed on an unwritable or broken stream
    pub send_failures: AtomicU64,
    /// Receive loops that ended on a protocol or transport error
    pub receive_failures: AtomicU64,
    /// `Disconnected` notifications raised
    pub disconnects: AtomicU64,
    start_time: Instant,
}

impl PeerMetrics {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            oversized_dropped: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            receive_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn oversized_drop(&self) {
        self.oversized_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receive_failure(&self) {
        self.receive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            oversized_dropped: self.oversized_dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_summary(&self, peer: &str) {
        let snapshot = self.snapshot();
        info!(
            peer,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            oversized_dropped = snapshot.oversized_dropped,
            send_failures = snapshot.send_failures,
            receive_failures = snapshot.receive_failures,
            disconnects = snapshot.disconnects,
            uptime_seconds = snapshot.uptime_seconds,
            "Peer metrics snapshot"
        );
    }
}

impl Default for PeerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub oversized_dropped: u64,
    pub send_failures: u64,
    pub receive_failures: u64,
    pub disconnects: u64,
    pub uptime_seconds: u64,
}
