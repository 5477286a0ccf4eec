use super::buffer::RecordBuffer;
use super::metrics::{RegistryMetrics, RegistryMetricsSnapshot};
use super::parse::parse_inbound;
use super::types::{EventType, SyncEvent};
use crate::config::EventsConfig;
use crate::errors::{ConfigError, ProtocolError};
use crate::logger::{self, LogTag};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Per-event handler
pub type EventHandler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handler for flushed record batches
pub type BatchHandler = Arc<dyn Fn(EventType, &[SyncEvent]) + Send + Sync>;

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
enum HandlerKind {
    Event {
        resource_filter: Option<String>,
        handler: EventHandler,
    },
    Batch(BatchHandler),
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    event_type: EventType,
    kind: HandlerKind,
}

enum PendingOp {
    Add(Subscription),
    Remove(SubscriptionId),
}

#[derive(Default)]
struct RegistryState {
    /// Registration order is dispatch order
    subscriptions: Vec<Subscription>,
    /// Mutations requested from inside a handler
    pending: Vec<PendingOp>,
}

impl RegistryState {
    fn id_in_use(&self, id: SubscriptionId) -> bool {
        self.subscriptions.iter().any(|sub| sub.id == id)
            || self
                .pending
                .iter()
                .any(|op| matches!(op, PendingOp::Add(sub) if sub.id == id))
    }

    fn apply_pending(&mut self) {
        for op in std::mem::take(&mut self.pending) {
            match op {
                PendingOp::Add(sub) => self.subscriptions.push(sub),
                PendingOp::Remove(id) => self.subscriptions.retain(|sub| sub.id != id),
            }
        }
    }
}

/// Typed publish/subscribe fan-out
///
/// Handlers run synchronously on the dispatching thread, in registration
/// order. A panicking handler is logged and skipped.
///
/// Delivery is serialized across threads: one dispatch pass, batch flush or
/// buffer append runs at a time, and `subscribe` / `unsubscribe` from another
/// thread wait for the running pass. Subscribing or unsubscribing from inside
/// a handler is allowed: the change is queued and applied once the outermost
/// pass on that thread completes.
pub struct EventRegistry {
    state: Mutex<RegistryState>,
    /// Held for every delivery; the cell counts nested passes of the owner
    delivery: ReentrantMutex<Cell<usize>>,
    buffers: Mutex<HashMap<EventType, RecordBuffer<SyncEvent>>>,
    buffered_types: HashSet<EventType>,
    flush_size: usize,
    metrics: RegistryMetrics,
}

impl EventRegistry {
    pub fn new(config: &EventsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(RegistryState::default()),
            delivery: ReentrantMutex::new(Cell::new(0)),
            buffers: Mutex::new(HashMap::new()),
            buffered_types: config.buffered_event_types()?.into_iter().collect(),
            flush_size: config.flush_size,
            metrics: RegistryMetrics::default(),
        })
    }

    /// Register a handler for `event_type`, optionally limited to one resource id
    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        handler: F,
        resource_filter: Option<&str>,
    ) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.insert(
            event_type,
            HandlerKind::Event {
                resource_filter: resource_filter.map(str::to_string),
                handler: Arc::new(handler),
            },
        )
    }

    /// Register a handler that receives flushed batches of a buffered type
    pub fn subscribe_batch<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(EventType, &[SyncEvent]) + Send + Sync + 'static,
    {
        self.insert(event_type, HandlerKind::Batch(Arc::new(handler)))
    }

    fn insert(&self, event_type: EventType, kind: HandlerKind) -> SubscriptionId {
        let delivery = self.delivery.lock();
        let mut state = self.state.lock();

        let mut id = SubscriptionId(Uuid::new_v4());
        while state.id_in_use(id) {
            id = SubscriptionId(Uuid::new_v4());
        }

        let subscription = Subscription {
            id,
            event_type,
            kind,
        };
        if delivery.get() > 0 {
            state.pending.push(PendingOp::Add(subscription));
        } else {
            state.subscriptions.push(subscription);
        }
        drop(state);
        drop(delivery);

        logger::debug(
            LogTag::Events,
            &format!("Subscription {} registered for {}", id, event_type),
        );
        id
    }

    /// Remove exactly one subscription
    ///
    /// Returns `false` for an unknown (or already removed) id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let delivery = self.delivery.lock();
        let mut state = self.state.lock();

        let removed = if delivery.get() == 0 {
            let before = state.subscriptions.len();
            state.subscriptions.retain(|sub| sub.id != id);
            state.subscriptions.len() != before
        } else {
            let queued_add = state
                .pending
                .iter()
                .position(|op| matches!(op, PendingOp::Add(sub) if sub.id == id));
            let queued_remove = state
                .pending
                .iter()
                .any(|op| matches!(op, PendingOp::Remove(existing) if *existing == id));

            if let Some(index) = queued_add {
                state.pending.remove(index);
                true
            } else if !queued_remove && state.subscriptions.iter().any(|sub| sub.id == id) {
                state.pending.push(PendingOp::Remove(id));
                true
            } else {
                false
            }
        };
        drop(state);
        drop(delivery);

        if removed {
            logger::debug(LogTag::Events, &format!("Subscription {} removed", id));
        }
        removed
    }

    /// Deliver one event to every matching handler, in registration order
    pub fn dispatch(&self, event: &SyncEvent) -> DispatchReport {
        self.metrics.inc_dispatched();
        let event_type = event.event_type();
        let resource_id = event.resource_id();

        let _pass = DispatchPass::enter(self);
        let handlers: Vec<EventHandler> = {
            let state = self.state.lock();
            state
                .subscriptions
                .iter()
                .filter(|sub| sub.event_type == event_type)
                .filter_map(|sub| match &sub.kind {
                    HandlerKind::Event {
                        resource_filter,
                        handler,
                    } => match resource_filter {
                        Some(filter) if resource_id != Some(filter.as_str()) => None,
                        _ => Some(Arc::clone(handler)),
                    },
                    HandlerKind::Batch(_) => None,
                })
                .collect()
        };

        let mut report = DispatchReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    logger::error(
                        LogTag::Events,
                        &format!(
                            "Handler for {} panicked: {}",
                            event_type,
                            panic_message(panic.as_ref())
                        ),
                    );
                }
            }
        }

        self.metrics.add_deliveries(report.delivered as u64);
        self.metrics.add_handler_failures(report.failed as u64);
        report
    }

    /// Route an event: buffered types go through their record buffer,
    /// everything else is dispatched immediately
    pub fn ingest(&self, event: SyncEvent) {
        if self.buffered_types.contains(&event.event_type()) {
            self.buffer_record(event);
        } else {
            self.dispatch(&event);
        }
    }

    /// Parse and ingest a raw inbound frame; malformed frames are logged and dropped
    pub fn ingest_raw(&self, text: &str) -> Result<(), ProtocolError> {
        match parse_inbound(text) {
            Ok(event) => {
                self.ingest(event);
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_malformed();
                logger::warning(
                    LogTag::Events,
                    &format!("Dropping malformed inbound message: {}", e),
                );
                logger::verbose(LogTag::Events, &format!("Dropped frame: {}", text));
                Err(e)
            }
        }
    }

    /// Append a record to its category buffer
    ///
    /// Returns the number of records flushed by this call (0 while the
    /// buffer is still below `flush_size`).
    pub fn buffer_record(&self, record: SyncEvent) -> usize {
        let event_type = record.event_type();
        let _delivery = self.delivery.lock();
        let batch = {
            let mut buffers = self.buffers.lock();
            buffers
                .entry(event_type)
                .or_insert_with(|| RecordBuffer::new(self.flush_size))
                .push(record)
        };
        self.metrics.inc_buffered();

        match batch {
            Some(batch) => self.deliver_batch(event_type, batch),
            None => 0,
        }
    }

    /// Flush one category; a second flush of an empty buffer is a no-op
    pub fn flush(&self, event_type: EventType) -> usize {
        let _delivery = self.delivery.lock();
        let batch = self
            .buffers
            .lock()
            .get_mut(&event_type)
            .and_then(RecordBuffer::take);

        match batch {
            Some(batch) => self.deliver_batch(event_type, batch),
            None => 0,
        }
    }

    /// Flush every category; returns the total number of records delivered
    pub fn flush_all(&self) -> usize {
        EventType::ALL
            .iter()
            .map(|event_type| self.flush(*event_type))
            .sum()
    }

    pub fn buffered_len(&self, event_type: EventType) -> usize {
        self.buffers
            .lock()
            .get(&event_type)
            .map(RecordBuffer::len)
            .unwrap_or(0)
    }

    pub fn is_buffered_type(&self, event_type: EventType) -> bool {
        self.buffered_types.contains(&event_type)
    }

    /// Flush partially filled buffers every `interval`
    ///
    /// The task holds only a weak reference and ends once the registry is
    /// dropped; abort the handle to stop it earlier.
    pub fn spawn_flush_timer(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let flushed = registry.flush_all();
                if flushed > 0 {
                    logger::debug(
                        LogTag::Events,
                        &format!("Periodic flush delivered {} records", flushed),
                    );
                }
            }
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn metrics(&self) -> RegistryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run `f` with delivery held, so no other thread dispatches meanwhile
    ///
    /// Re-entrant: `f` may dispatch. Callers use this to make a state check
    /// and the dispatch that depends on it one step.
    pub fn with_delivery_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _delivery = self.delivery.lock();
        f()
    }

    /// Hand a batch to batch subscribers, then dispatch each record in order
    ///
    /// Callers hold the delivery lock from taking the batch until here.
    fn deliver_batch(&self, event_type: EventType, batch: Vec<SyncEvent>) -> usize {
        let pass = DispatchPass::enter(self);
        let handlers: Vec<BatchHandler> = {
            let state = self.state.lock();
            state
                .subscriptions
                .iter()
                .filter(|sub| sub.event_type == event_type)
                .filter_map(|sub| match &sub.kind {
                    HandlerKind::Batch(handler) => Some(Arc::clone(handler)),
                    HandlerKind::Event { .. } => None,
                })
                .collect()
        };

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event_type, &batch))) {
                self.metrics.add_handler_failures(1);
                logger::error(
                    LogTag::Events,
                    &format!(
                        "Batch handler for {} panicked: {}",
                        event_type,
                        panic_message(panic.as_ref())
                    ),
                );
            }
        }
        drop(pass);

        self.metrics.inc_batches();
        logger::debug(
            LogTag::Events,
            &format!("Flushed {} {} records", batch.len(), event_type),
        );

        for record in &batch {
            self.dispatch(record);
        }
        batch.len()
    }
}

/// One dispatch pass; the outermost pass on a thread applies queued mutations
struct DispatchPass<'a> {
    registry: &'a EventRegistry,
    depth: ReentrantMutexGuard<'a, Cell<usize>>,
}

impl<'a> DispatchPass<'a> {
    fn enter(registry: &'a EventRegistry) -> Self {
        let depth = registry.delivery.lock();
        depth.set(depth.get() + 1);
        Self { registry, depth }
    }
}

impl Drop for DispatchPass<'_> {
    fn drop(&mut self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.registry.state.lock().apply_pending();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
