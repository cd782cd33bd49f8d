use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free runtime diagnostics for the pipeline.
///
/// Purpose:
/// - Track trade throughput end to end (received / enqueued)
/// - Track parse failures, reconnects, ping drops, starvation events
///
/// Design:
/// - Atomics only, `Ordering::Relaxed` everywhere — these are counters
///   for a human to read in logs, not a synchronization mechanism.
/// - Never read by control flow; a missing or stale counter must not
///   change pipeline behavior.
#[derive(Default)]
pub struct RuntimeMetrics {
    pub trades_received: AtomicU64,
    pub trades_enqueued: AtomicU64,
    pub parse_errors: AtomicU64,
    pub ws_reconnects: AtomicU64,
    pub starvation_events: AtomicU64,
    pub ping_drops: AtomicU64,
}

impl RuntimeMetrics {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_received(&self) {
        Self::inc(&self.trades_received);
    }
    pub fn record_trade_enqueued(&self) {
        Self::inc(&self.trades_enqueued);
    }
    pub fn record_parse_error(&self) {
        Self::inc(&self.parse_errors);
    }
    pub fn record_reconnect(&self) {
        Self::inc(&self.ws_reconnects);
    }
    pub fn record_starvation(&self) {
        Self::inc(&self.starvation_events);
    }
    pub fn record_ping_drop(&self) {
        Self::inc(&self.ping_drops);
    }
}
