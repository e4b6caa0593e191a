//! Observability and Metrics
//!
//! Counters describing connection churn and request outcomes for one gateway
//! instance. Each [`GatewayServer`](crate::transport::server::GatewayServer)
//! owns its own [`Metrics`] so independent servers never share counters.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for gateway operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections assigned a slot
    pub connections_total: AtomicU64,
    /// Currently occupied slots
    pub connections_active: AtomicU64,
    /// Connections accepted and dropped because every slot was taken
    pub connections_rejected: AtomicU64,
    /// Connections closed by the whole-server idle sweep
    pub connections_idle_dropped: AtomicU64,
    /// Total messages received
    pub messages_received: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Total responses written
    pub responses_sent: AtomicU64,
    /// Total bytes written
    pub bytes_sent: AtomicU64,
    /// Messages that produced no response and closed the connection
    pub disconnect_replies: AtomicU64,
    /// Frames rejected by validation
    pub protocol_errors: AtomicU64,
    /// Device bridge calls that reported a transport failure
    pub bridge_failures: AtomicU64,
    /// Accept, read or write failures
    pub socket_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            connections_idle_dropped: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            disconnect_replies: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            bridge_failures: AtomicU64::new(0),
            socket_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a connection taking a slot
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a slot being freed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idle_dropped(&self, count: u64) {
        self.connections_idle_dropped
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a message received
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a response written
    pub fn response_sent(&self, byte_count: u64) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn disconnect_reply(&self) {
        self.disconnect_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bridge_failure(&self) {
        self.bridge_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn socket_error(&self) {
        self.socket_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_idle_dropped: self.connections_idle_dropped.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            disconnect_replies: self.disconnect_replies.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            bridge_failures: self.bridge_failures.load(Ordering::Relaxed),
            socket_errors: self.socket_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            connections_idle_dropped = snapshot.connections_idle_dropped,
            messages_received = snapshot.messages_received,
            bytes_received = snapshot.bytes_received,
            responses_sent = snapshot.responses_sent,
            bytes_sent = snapshot.bytes_sent,
            disconnect_replies = snapshot.disconnect_replies,
            protocol_errors = snapshot.protocol_errors,
            bridge_failures = snapshot.bridge_failures,
            socket_errors = snapshot.socket_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Gateway metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub connections_idle_dropped: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub responses_sent: u64,
    pub bytes_sent: u64,
    pub disconnect_replies: u64,
    pub protocol_errors: u64,
    pub bridge_failures: u64,
    pub socket_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counters_balance() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();
        metrics.connection_rejected();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.connections_rejected, 1);
    }

    #[test]
    fn byte_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.message_received(4);
        metrics.message_received(12);
        metrics.response_sent(8);

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.bytes_received, 16);
        assert_eq!(snap.responses_sent, 1);
        assert_eq!(snap.bytes_sent, 8);
    }
}
