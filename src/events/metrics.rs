use serde::Serialize;
/// Registry metrics collection
///
/// Counters are updated on the dispatch path, so they are plain atomics.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Events passed to `dispatch`
    events_dispatched: AtomicU64,

    /// Successful handler invocations
    deliveries: AtomicU64,

    /// Handlers that panicked
    handler_failures: AtomicU64,

    /// Inbound frames dropped as malformed
    malformed_dropped: AtomicU64,

    /// Records accepted into a buffer
    records_buffered: AtomicU64,

    /// Batches handed to batch subscribers
    batches_flushed: AtomicU64,
}

impl RegistryMetrics {
    pub fn inc_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_handler_failures(&self, count: u64) {
        self.handler_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffered(&self) {
        self.records_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RegistryMetricsSnapshot {
        RegistryMetricsSnapshot {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            records_buffered: self.records_buffered.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryMetricsSnapshot {
    pub events_dispatched: u64,
    pub deliveries: u64,
    pub handler_failures: u64,
    pub malformed_dropped: u64,
    pub records_buffered: u64,
    pub batches_flushed: u64,
}
