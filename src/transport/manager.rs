use super::channel::{LiveChannel, LiveConnector};
use super::poll::{PollOutcome, PollSource};
use super::types::{ConnectionState, ConnectionStatus, ConnectionType};
use crate::backoff::BackoffPolicy;
use crate::config::TransportConfig;
use crate::errors::{ConfigError, TransportError};
use crate::events::{EventRegistry, EventType, SubscriptionId, SyncEvent};
use crate::health::HealthMonitor;
use crate::logger::{self, LogTag};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Text frame sent on an idle live channel
pub const HEARTBEAT_FRAME: &str = r#"{"type":"ping"}"#;

/// How long `cleanup` waits for the live channel to close gracefully
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveState {
    Idle,
    Connecting,
    Connected,
}

struct ManagerState {
    initialized: bool,
    live: LiveState,
    reconnect_attempts: u32,
    /// Bumped on cleanup; tasks from an older generation never touch state
    generation: u64,
    /// Bumped whenever polling stops; a poll finishing late is discarded
    poll_generation: u64,
    driver: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
    owned_subscriptions: Vec<SubscriptionId>,
    last_poll: Option<PollOutcome>,
    last_published: ConnectionStatus,
}

impl ManagerState {
    fn status(&self) -> ConnectionStatus {
        let connection_type = match (self.live, self.poll_task.is_some()) {
            (LiveState::Connected, _) => ConnectionType::Live,
            (_, true) => ConnectionType::Polling,
            _ => ConnectionType::Disconnected,
        };
        ConnectionStatus {
            is_connected: self.live == LiveState::Connected,
            connection_type,
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    fn stop_polling(&mut self) -> bool {
        self.poll_generation += 1;
        match self.poll_task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

enum ChannelExit {
    Lost(String),
    Shutdown,
}

/// Owns the single logical live channel for one backend
///
/// Prefers a live channel; whenever it is unavailable the manager polls
/// instead, and retries the live channel with exponential backoff up to
/// `max_reconnect_attempts`. Once the live channel is open, polling is
/// stopped before the state reads `Connected`, so both paths never deliver
/// at the same time.
pub struct TransportManager {
    config: TransportConfig,
    reconnect_policy: BackoffPolicy,
    connector: Option<Arc<dyn LiveConnector>>,
    poller: Arc<dyn PollSource>,
    registry: Arc<EventRegistry>,
    health: Option<Arc<HealthMonitor>>,
    state: Mutex<ManagerState>,
}

impl TransportManager {
    pub fn new(
        config: TransportConfig,
        connector: Option<Arc<dyn LiveConnector>>,
        poller: Arc<dyn PollSource>,
        registry: Arc<EventRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let reconnect_policy =
            BackoffPolicy::doubling(config.reconnect_base_delay(), config.reconnect_max_delay());

        Ok(Self {
            config,
            reconnect_policy,
            connector,
            poller,
            registry,
            health: None,
            state: Mutex::new(ManagerState {
                initialized: false,
                live: LiveState::Idle,
                reconnect_attempts: 0,
                generation: 0,
                poll_generation: 0,
                driver: None,
                poll_task: None,
                shutdown: Arc::new(Notify::new()),
                owned_subscriptions: Vec::new(),
                last_poll: None,
                last_published: ConnectionStatus::disconnected(),
            }),
        })
    }

    /// Gate reconnect attempts on this monitor's view of the backend
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    /// Start delivering updates; returns `false` if already initialized
    ///
    /// Opens the live channel when a connector is configured, otherwise
    /// starts polling right away. Must be called from within a tokio runtime.
    pub fn initialize_real_time_updates(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.initialized {
            return false;
        }
        state.initialized = true;
        state.reconnect_attempts = 0;
        let generation = state.generation;

        match &self.connector {
            Some(connector) => {
                logger::info(
                    LogTag::Transport,
                    &format!("Opening live channel to {}", connector.endpoint()),
                );
                state.live = LiveState::Connecting;
                state.shutdown = Arc::new(Notify::new());
                let shutdown = Arc::clone(&state.shutdown);
                state.driver = Some(tokio::spawn(run_live_driver(
                    Arc::downgrade(self),
                    Arc::clone(connector),
                    generation,
                    shutdown,
                )));
            }
            None => {
                logger::info(
                    LogTag::Transport,
                    &format!(
                        "No live channel configured, polling {}",
                        self.poller.endpoint()
                    ),
                );
                self.start_polling(&mut state);
            }
        }

        let published = self.take_status_change(&mut state);
        drop(state);
        self.publish(published);
        true
    }

    /// Tear everything down; safe to call repeatedly
    ///
    /// Closes the live channel, cancels the poll timer and reconnect timer,
    /// flushes buffered records once no more frames can arrive, then removes
    /// subscriptions registered through this manager. Returns the number of
    /// records flushed.
    pub async fn cleanup(&self) -> usize {
        let (driver, shutdown, owned, published) = {
            let mut state = self.state.lock();
            if !state.initialized && state.owned_subscriptions.is_empty() {
                return 0;
            }
            state.initialized = false;
            state.generation += 1;
            state.stop_polling();
            state.live = LiveState::Idle;
            state.reconnect_attempts = 0;
            let published = self.take_status_change(&mut state);
            (
                state.driver.take(),
                Arc::clone(&state.shutdown),
                std::mem::take(&mut state.owned_subscriptions),
                published,
            )
        };

        if let Some(mut driver) = driver {
            shutdown.notify_one();
            if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }

        self.publish(published);
        let flushed = self.registry.flush_all();
        for id in &owned {
            self.registry.unsubscribe(*id);
        }

        logger::info(
            LogTag::Transport,
            &format!(
                "Transport cleaned up ({} records flushed, {} subscriptions released)",
                flushed,
                owned.len()
            ),
        );
        flushed
    }

    /// Pure read of the current status
    pub fn get_connection_status(&self) -> ConnectionStatus {
        self.state.lock().status()
    }

    pub fn connection_state(&self) -> ConnectionState {
        let state = self.state.lock();
        match state.live {
            LiveState::Connected => ConnectionState::Connected,
            LiveState::Connecting => ConnectionState::Connecting,
            LiveState::Idle if state.poll_task.is_some() => ConnectionState::Degraded,
            LiveState::Idle => ConnectionState::Disconnected,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state.lock().poll_task.is_some()
    }

    pub fn last_poll_outcome(&self) -> Option<PollOutcome> {
        self.state.lock().last_poll.clone()
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Subscribe through the manager; the subscription is released by `cleanup`
    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        handler: F,
        resource_filter: Option<&str>,
    ) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = self.registry.subscribe(event_type, handler, resource_filter);
        self.state.lock().owned_subscriptions.push(id);
        id
    }

    /// Batch counterpart of `subscribe`; also released by `cleanup`
    pub fn subscribe_batch<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(EventType, &[SyncEvent]) + Send + Sync + 'static,
    {
        let id = self.registry.subscribe_batch(event_type, handler);
        self.state.lock().owned_subscriptions.push(id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().owned_subscriptions.retain(|owned| *owned != id);
        self.registry.unsubscribe(id)
    }

    // -------------------------------------------------------------------------
    // State transitions (driver / poll tasks)
    // -------------------------------------------------------------------------

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.initialized && state.generation == generation
    }

    fn begin_connect(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if !state.initialized || state.generation != generation {
            return false;
        }
        state.live = LiveState::Connecting;
        let published = self.take_status_change(&mut state);
        drop(state);
        self.publish(published);
        true
    }

    /// Runs under the registry's delivery lock, so a poll result already
    /// being delivered finishes before the state reads `Connected`
    fn on_open(&self, generation: u64) -> bool {
        self.registry.with_delivery_lock(|| self.complete_open(generation))
    }

    fn complete_open(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if !state.initialized || state.generation != generation {
            return false;
        }
        let was_polling = state.stop_polling();
        state.live = LiveState::Connected;
        state.reconnect_attempts = 0;
        let published = self.take_status_change(&mut state);
        drop(state);

        logger::info(
            LogTag::Transport,
            &format!(
                "Live channel connected{}",
                if was_polling { ", polling stopped" } else { "" }
            ),
        );
        self.publish(published);
        true
    }

    fn on_lost(self: &Arc<Self>, generation: u64, reason: &str) {
        let mut state = self.state.lock();
        if !state.initialized || state.generation != generation {
            return;
        }
        let was_connected = state.live == LiveState::Connected;
        state.live = LiveState::Idle;
        self.start_polling(&mut state);
        let published = self.take_status_change(&mut state);
        drop(state);

        if was_connected {
            logger::warning(
                LogTag::Transport,
                &format!("Live channel lost: {}; falling back to polling", reason),
            );
        } else {
            logger::warning(
                LogTag::Transport,
                &format!("Live channel unavailable: {}; polling", reason),
            );
        }
        self.publish(published);
    }

    /// Count a reconnect attempt; `None` once the cap is reached
    fn schedule_reconnect(&self, generation: u64) -> Option<Duration> {
        let mut state = self.state.lock();
        if !state.initialized || state.generation != generation {
            return None;
        }

        if state.reconnect_attempts >= self.config.max_reconnect_attempts {
            drop(state);
            logger::warning(
                LogTag::Transport,
                &format!(
                    "Giving up on live channel after {} reconnect attempts; staying in polling",
                    self.config.max_reconnect_attempts
                ),
            );
            return None;
        }

        let delay = self.reconnect_policy.delay(state.reconnect_attempts);
        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        let published = self.take_status_change(&mut state);
        drop(state);

        logger::info(
            LogTag::Transport,
            &format!(
                "Reconnect attempt {}/{} in {}ms",
                attempt,
                self.config.max_reconnect_attempts,
                delay.as_millis()
            ),
        );
        self.publish(published);
        Some(delay)
    }

    fn backend_unhealthy(&self) -> bool {
        match &self.health {
            Some(health) => health.is_running() && !health.status().is_healthy,
            None => false,
        }
    }

    fn start_polling(self: &Arc<Self>, state: &mut ManagerState) {
        if state.poll_task.is_some() {
            return;
        }
        state.poll_generation += 1;
        let poll_generation = state.poll_generation;
        state.poll_task = Some(tokio::spawn(run_poll_loop(
            Arc::downgrade(self),
            Arc::clone(&self.poller),
            self.config.poll_interval(),
            poll_generation,
        )));
        logger::info(
            LogTag::Transport,
            &format!(
                "Polling {} every {}ms",
                self.poller.endpoint(),
                self.config.poll_interval_ms
            ),
        );
    }

    /// Store a poll outcome if polling is still active for `poll_generation`
    ///
    /// The generation check and the `Refresh` dispatch happen under one
    /// delivery lock; `on_open` takes the same lock before stopping polling.
    fn record_poll(&self, poll_generation: u64, outcome: PollOutcome) -> bool {
        self.registry.with_delivery_lock(|| {
            {
                let mut state = self.state.lock();
                if state.poll_generation != poll_generation || state.poll_task.is_none() {
                    return false;
                }
                state.last_poll = Some(outcome.clone());
            }

            match &outcome {
                PollOutcome::Refreshed { latency_ms, .. } => {
                    logger::debug(
                        LogTag::Transport,
                        &format!("Poll ok ({}ms)", latency_ms),
                    );
                    self.registry.dispatch(&SyncEvent::refresh("poll"));
                }
                PollOutcome::Ignored { reason } => {
                    logger::debug(LogTag::Transport, &format!("Poll ignored: {}", reason));
                }
            }
            true
        })
    }

    fn take_status_change(&self, state: &mut ManagerState) -> Option<ConnectionStatus> {
        let status = state.status();
        if status == state.last_published {
            return None;
        }
        state.last_published = status;
        Some(status)
    }

    fn publish(&self, status: Option<ConnectionStatus>) {
        if let Some(status) = status {
            logger::debug(
                LogTag::Transport,
                &format!(
                    "Connection status: {} (attempts={})",
                    status.connection_type, status.reconnect_attempts
                ),
            );
            self.registry.dispatch(&SyncEvent::connection_changed(status));
        }
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.stop_polling();
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn run_live_driver(
    manager: Weak<TransportManager>,
    connector: Arc<dyn LiveConnector>,
    generation: u64,
    shutdown: Arc<Notify>,
) {
    loop {
        let heartbeat = {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if !manager.begin_connect(generation) {
                return;
            }
            manager.config.heartbeat_interval()
        };

        let attempt = tokio::select! {
            _ = shutdown.notified() => return,
            result = connector.connect() => result,
        };

        let reason = match attempt {
            Ok(mut channel) => {
                let opened = match manager.upgrade() {
                    Some(manager) => manager.on_open(generation),
                    None => false,
                };
                if !opened {
                    channel.close().await;
                    return;
                }

                match pump_channel(&manager, generation, channel.as_mut(), &shutdown, heartbeat)
                    .await
                {
                    ChannelExit::Shutdown => {
                        channel.close().await;
                        return;
                    }
                    ChannelExit::Lost(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        let delay = {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            manager.on_lost(generation, &reason);
            match manager.schedule_reconnect(generation) {
                Some(delay) => delay,
                None => return,
            }
        };

        // Wait out the backoff; while the backend is known to be down the
        // attempt is postponed without being counted
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(manager) = manager.upgrade() else {
                return;
            };
            if !manager.is_current(generation) {
                return;
            }
            if !manager.backend_unhealthy() {
                break;
            }
            logger::debug(
                LogTag::Transport,
                "Backend unhealthy, postponing reconnect attempt",
            );
        }
    }
}

async fn pump_channel(
    manager: &Weak<TransportManager>,
    generation: u64,
    channel: &mut dyn LiveChannel,
    shutdown: &Notify,
    heartbeat: Duration,
) -> ChannelExit {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => return ChannelExit::Shutdown,
            _ = ticker.tick() => {
                if let Err(e) = channel.send_text(HEARTBEAT_FRAME.to_string()).await {
                    return ChannelExit::Lost(e.to_string());
                }
            }
            frame = channel.next_message() => match frame {
                Ok(Some(text)) => {
                    let Some(manager) = manager.upgrade() else {
                        return ChannelExit::Shutdown;
                    };
                    if !manager.is_current(generation) {
                        return ChannelExit::Shutdown;
                    }
                    if !is_heartbeat_reply(&text) {
                        // Malformed frames are logged and counted by the registry
                        let _ = manager.registry.ingest_raw(&text);
                    }
                }
                Ok(None) => return ChannelExit::Lost(TransportError::Closed.to_string()),
                Err(e) => return ChannelExit::Lost(e.to_string()),
            },
        }
    }
}

async fn run_poll_loop(
    manager: Weak<TransportManager>,
    poller: Arc<dyn PollSource>,
    interval: Duration,
    poll_generation: u64,
) {
    loop {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(interval, poller.poll()).await {
            Ok(Ok(status)) => PollOutcome::Refreshed {
                status,
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => PollOutcome::Ignored {
                reason: e.to_string(),
            },
            Err(_) => PollOutcome::Ignored {
                reason: TransportError::Timeout {
                    timeout_ms: interval.as_millis() as u64,
                }
                .to_string(),
            },
        };

        {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if !manager.record_poll(poll_generation, outcome) {
                return;
            }
        }

        tokio::time::sleep(interval).await;
    }
}

fn is_heartbeat_reply(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("type").and_then(|t| t.as_str()).map(|t| t == "pong"))
        .unwrap_or(false)
}
