//! Per-session owner of the synchronization layer
//!
//! A `SyncSession` is built from one `SyncConfig` and owns the health
//! monitor, the event registry and the transport manager. Dashboard code
//! talks only to the session: `subscribe`, `unsubscribe`,
//! `connection_status`, `is_backend_healthy`, `force_check`.

use crate::config::{SyncConfig, TransportConfig};
use crate::errors::ConfigError;
use crate::events::{EventRegistry, EventType, RegistryMetricsSnapshot, SubscriptionId, SyncEvent};
use crate::health::{HealthMonitor, HealthProbe, HealthStatus, HttpHealthProbe};
use crate::logger::{self, LogTag};
use crate::transport::{
    ConnectionStatus, HttpPollSource, LiveConnector, PollOutcome, PollSource, TransportManager,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct SessionState {
    started: bool,
    flush_timer: Option<JoinHandle<()>>,
}

pub struct SyncSession {
    config: SyncConfig,
    health: Arc<HealthMonitor>,
    registry: Arc<EventRegistry>,
    transport: Arc<TransportManager>,
    state: Mutex<SessionState>,
}

impl SyncSession {
    /// Build a session with the HTTP probe, HTTP poller and (with the `live`
    /// feature) the WebSocket connector
    pub fn new(config: SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let probe = HttpHealthProbe::from_config(&config.health)
            .map_err(|e| ConfigError::invalid("health.base_url", e.to_string()))?;
        let poll_url = config
            .transport
            .poll_url
            .clone()
            .unwrap_or_else(|| config.health.health_url());
        let poller = HttpPollSource::new(poll_url)
            .map_err(|e| ConfigError::invalid("transport.poll_url", e.to_string()))?;
        let connector = live_connector(&config.transport);

        Self::with_parts(config, Arc::new(probe), connector, Arc::new(poller))
    }

    /// Build a session around caller-supplied probe / connector / poller
    pub fn with_parts(
        config: SyncConfig,
        probe: Arc<dyn HealthProbe>,
        connector: Option<Arc<dyn LiveConnector>>,
        poller: Arc<dyn PollSource>,
    ) -> Result<Self, ConfigError> {
        let health = Arc::new(HealthMonitor::new(config.health.clone(), probe)?);
        let registry = Arc::new(EventRegistry::new(&config.events)?);
        let transport = Arc::new(
            TransportManager::new(
                config.transport.clone(),
                connector,
                poller,
                Arc::clone(&registry),
            )?
            .with_health(Arc::clone(&health)),
        );

        Ok(Self {
            config,
            health,
            registry,
            transport,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Start health probing, real-time updates and the periodic flush
    ///
    /// Returns `false` if the session is already running.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.started {
            return false;
        }
        state.started = true;

        self.health.start();
        self.transport.initialize_real_time_updates();
        state.flush_timer = Some(
            self.registry
                .spawn_flush_timer(self.config.events.flush_interval()),
        );
        drop(state);

        logger::info(LogTag::System, "Sync session started");
        true
    }

    /// Stop everything in reverse start order
    ///
    /// The transport flushes buffers once the live channel is down, so
    /// records ingested while it closes still go out.
    pub async fn shutdown(&self) {
        let flush_timer = {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            state.started = false;
            state.flush_timer.take()
        };

        if let Some(timer) = flush_timer {
            timer.abort();
        }
        let flushed = self.transport.cleanup().await;
        self.health.stop();

        logger::info(
            LogTag::System,
            &format!("Sync session stopped ({} buffered records flushed)", flushed),
        );
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().started
    }

    // -------------------------------------------------------------------------
    // Consumer API
    // -------------------------------------------------------------------------

    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        handler: F,
        resource_filter: Option<&str>,
    ) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.transport.subscribe(event_type, handler, resource_filter)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.transport.unsubscribe(id)
    }

    pub fn subscribe_batch<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(EventType, &[SyncEvent]) + Send + Sync + 'static,
    {
        self.transport.subscribe_batch(event_type, handler)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.get_connection_status()
    }

    pub fn is_backend_healthy(&self) -> bool {
        self.health.is_backend_healthy()
    }

    pub async fn force_check(&self) -> bool {
        self.health.force_check().await
    }

    /// Buffer a record for batched delivery; returns records flushed by this call
    pub fn buffer_record(&self, record: SyncEvent) -> usize {
        self.registry.buffer_record(record)
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn last_poll_outcome(&self) -> Option<PollOutcome> {
        self.transport.last_poll_outcome()
    }

    pub fn event_metrics(&self) -> RegistryMetricsSnapshot {
        self.registry.metrics()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<TransportManager> {
        &self.transport
    }
}

#[cfg(feature = "live")]
fn live_connector(config: &TransportConfig) -> Option<Arc<dyn LiveConnector>> {
    config
        .live_url
        .as_ref()
        .map(|url| Arc::new(crate::transport::WsConnector::new(url.clone())) as Arc<dyn LiveConnector>)
}

#[cfg(not(feature = "live"))]
fn live_connector(config: &TransportConfig) -> Option<Arc<dyn LiveConnector>> {
    if config.live_url.is_some() {
        logger::warning(
            LogTag::Transport,
            "transport.live_url is set but live channel support is not compiled in; polling only",
        );
    }
    None
}
