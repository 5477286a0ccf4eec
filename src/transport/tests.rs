use super::*;
use crate::config::{EventsConfig, HealthConfig, TransportConfig};
use crate::errors::TransportError;
use crate::events::{EventPayload, EventRegistry, EventType, SyncEvent};
use crate::health::{HealthMonitor, HealthProbe, ProbeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// =============================================================================
// TEST DOUBLES
// =============================================================================

#[derive(Clone)]
enum Behavior {
    Fail,
    OpenThenError(Duration),
    OpenForever,
    OpenWithFrames(Vec<String>),
}

struct MockConnector {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    connects: AtomicUsize,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl MockConnector {
    fn new(script: Vec<Behavior>, fallback: Behavior) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            connects: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    fn endpoint(&self) -> &str {
        "ws://mock/live"
    }

    async fn connect(&self) -> Result<Box<dyn LiveChannel>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let (frames, fail_at) = match behavior {
            Behavior::Fail => {
                return Err(TransportError::Connect {
                    endpoint: "ws://mock/live".to_string(),
                    reason: "connection refused".to_string(),
                })
            }
            Behavior::OpenThenError(after) => (Vec::new(), Some(Instant::now() + after)),
            Behavior::OpenForever => (Vec::new(), None),
            Behavior::OpenWithFrames(frames) => (frames, None),
        };

        Ok(Box::new(MockChannel {
            frames: frames.into(),
            fail_at,
            sent: Arc::clone(&self.sent),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MockChannel {
    frames: VecDeque<String>,
    fail_at: Option<Instant>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveChannel for MockChannel {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match self.fail_at {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                Err(TransportError::Network("connection reset".to_string()))
            }
            None => std::future::pending().await,
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockPoller {
    calls: AtomicUsize,
    healthy: AtomicBool,
}

impl MockPoller {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollSource for MockPoller {
    fn endpoint(&self) -> &str {
        "http://mock/health"
    }

    async fn poll(&self) -> Result<u16, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(200)
        } else {
            Err(TransportError::HttpStatus {
                endpoint: "http://mock/health".to_string(),
                status: 503,
            })
        }
    }
}

struct ToggleProbe {
    healthy: AtomicBool,
}

#[async_trait]
impl HealthProbe for ToggleProbe {
    fn target(&self) -> &str {
        "toggle"
    }

    async fn probe(&self) -> ProbeResult {
        if self.healthy.load(Ordering::SeqCst) {
            ProbeResult::success(5)
        } else {
            ProbeResult::failure("HTTP 502")
        }
    }
}

fn transport_config(max_reconnect_attempts: u32) -> TransportConfig {
    TransportConfig {
        poll_interval_ms: 1000,
        reconnect_base_delay_ms: 1000,
        reconnect_max_delay_ms: 30_000,
        max_reconnect_attempts,
        heartbeat_interval_ms: 30_000,
        ..TransportConfig::default()
    }
}

fn build(
    config: TransportConfig,
    connector: Option<Arc<MockConnector>>,
    poller: Arc<MockPoller>,
) -> (Arc<TransportManager>, Arc<EventRegistry>) {
    let registry = Arc::new(EventRegistry::new(&EventsConfig::default()).unwrap());
    let manager = TransportManager::new(
        config,
        connector.map(|c| c as Arc<dyn LiveConnector>),
        poller,
        Arc::clone(&registry),
    )
    .unwrap();
    (Arc::new(manager), registry)
}

fn status(is_connected: bool, connection_type: ConnectionType, attempts: u32) -> ConnectionStatus {
    ConnectionStatus {
        is_connected,
        connection_type,
        reconnect_attempts: attempts,
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_only_without_live_target() {
    let poller = MockPoller::new();
    let (manager, registry) = build(transport_config(5), None, Arc::clone(&poller));

    let refreshes = Arc::new(AtomicUsize::new(0));
    {
        let refreshes = Arc::clone(&refreshes);
        registry.subscribe(
            EventType::Refresh,
            move |_event: &SyncEvent| {
                refreshes.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );
    }

    assert!(manager.initialize_real_time_updates());
    assert!(!manager.initialize_real_time_updates());
    assert_eq!(
        manager.get_connection_status(),
        status(false, ConnectionType::Polling, 0)
    );
    assert_eq!(manager.connection_state(), ConnectionState::Degraded);

    tokio::time::sleep(ms(10)).await;
    assert_eq!(poller.calls(), 1);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        manager.last_poll_outcome(),
        Some(PollOutcome::Refreshed { status: 200, .. })
    ));

    // Failures are tolerated: outcome recorded, state untouched
    poller.healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(ms(1000)).await;
    assert_eq!(poller.calls(), 2);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    match manager.last_poll_outcome() {
        Some(PollOutcome::Ignored { reason }) => assert!(reason.contains("503")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        manager.get_connection_status(),
        status(false, ConnectionType::Polling, 0)
    );

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_channel_error_falls_back_and_reconnects_with_cap() {
    let connector = MockConnector::new(vec![Behavior::OpenThenError(ms(500))], Behavior::Fail);
    let poller = MockPoller::new();
    let (manager, _registry) = build(
        transport_config(3),
        Some(Arc::clone(&connector)),
        Arc::clone(&poller),
    );

    assert!(manager.initialize_real_time_updates());
    assert_eq!(manager.connection_state(), ConnectionState::Connecting);

    tokio::time::sleep(ms(10)).await;
    assert_eq!(connector.connects(), 1);
    assert_eq!(
        manager.get_connection_status(),
        status(true, ConnectionType::Live, 0)
    );
    assert!(!manager.is_polling());
    assert_eq!(poller.calls(), 0);

    // t=500: channel errors; polling starts at once, reconnect scheduled later
    tokio::time::sleep(ms(500)).await;
    assert!(manager.is_polling());
    assert_eq!(poller.calls(), 1);
    assert_eq!(
        manager.get_connection_status(),
        status(false, ConnectionType::Polling, 1)
    );
    assert_eq!(connector.connects(), 1);

    // Retries at t=1500 (+1000), t=3500 (+2000), t=7500 (+4000)
    tokio::time::sleep(ms(1000)).await;
    assert_eq!(connector.connects(), 2);
    tokio::time::sleep(ms(2000)).await;
    assert_eq!(connector.connects(), 3);
    tokio::time::sleep(ms(4000)).await;
    assert_eq!(connector.connects(), 4);

    // Cap reached: no further attempts, polling continues
    let polls_before = poller.calls();
    tokio::time::sleep(ms(120_000)).await;
    assert_eq!(connector.connects(), 4);
    assert!(poller.calls() > polls_before);
    assert_eq!(
        manager.get_connection_status(),
        status(false, ConnectionType::Polling, 3)
    );

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_channel_replaces_polling() {
    let connector = MockConnector::new(vec![Behavior::Fail], Behavior::OpenForever);
    let poller = MockPoller::new();
    let (manager, _registry) = build(
        transport_config(5),
        Some(Arc::clone(&connector)),
        Arc::clone(&poller),
    );

    manager.initialize_real_time_updates();
    tokio::time::sleep(ms(10)).await;
    assert!(manager.is_polling());
    assert_eq!(
        manager.get_connection_status(),
        status(false, ConnectionType::Polling, 1)
    );

    tokio::time::sleep(ms(1000)).await;
    assert_eq!(connector.connects(), 2);
    assert_eq!(
        manager.get_connection_status(),
        status(true, ConnectionType::Live, 0)
    );
    assert!(!manager.is_polling());

    let polls = poller.calls();
    tokio::time::sleep(ms(10_000)).await;
    assert_eq!(poller.calls(), polls);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_inbound_frames_reach_subscribers() {
    let frames = vec![
        r#"{"type":"workspace.created","timestamp":"2024-05-01T12:00:00Z","data":{"id":"ws-1"}}"#
            .to_string(),
        "garbage".to_string(),
        r#"{"type":"pong"}"#.to_string(),
        r#"{"type":"workspace.deleted","timestamp":"2024-05-01T12:00:01Z","data":{"id":"ws-1"}}"#
            .to_string(),
    ];
    let connector = MockConnector::new(vec![Behavior::OpenWithFrames(frames)], Behavior::OpenForever);
    let (manager, registry) = build(transport_config(5), Some(connector), MockPoller::new());

    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in [EventType::WorkspaceCreated, EventType::WorkspaceDeleted] {
        let seen = Arc::clone(&seen);
        manager.subscribe(
            event_type,
            move |event: &SyncEvent| seen.lock().push(event.event_type()),
            Some("ws-1"),
        );
    }

    manager.initialize_real_time_updates();
    tokio::time::sleep(ms(10)).await;

    assert_eq!(
        *seen.lock(),
        vec![EventType::WorkspaceCreated, EventType::WorkspaceDeleted]
    );
    assert_eq!(registry.metrics().malformed_dropped, 1);
    assert!(manager.get_connection_status().is_connected);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_while_connected() {
    let connector = MockConnector::new(vec![], Behavior::OpenForever);
    let mut config = transport_config(5);
    config.heartbeat_interval_ms = 5000;
    let (manager, _registry) = build(config, Some(Arc::clone(&connector)), MockPoller::new());

    manager.initialize_real_time_updates();
    tokio::time::sleep(ms(10)).await;
    assert!(connector.sent.lock().is_empty());

    tokio::time::sleep(ms(5000)).await;
    assert_eq!(*connector.sent.lock(), vec![HEARTBEAT_FRAME.to_string()]);
    tokio::time::sleep(ms(5000)).await;
    assert_eq!(connector.sent.lock().len(), 2);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_twice_is_safe_and_final() {
    let connector = MockConnector::new(vec![], Behavior::OpenForever);
    let poller = MockPoller::new();
    let (manager, registry) = build(
        transport_config(5),
        Some(Arc::clone(&connector)),
        Arc::clone(&poller),
    );

    let changes = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = Arc::clone(&changes);
        registry.subscribe(
            EventType::ConnectionChanged,
            move |event: &SyncEvent| {
                if let EventPayload::ConnectionChanged(status) = &event.payload {
                    changes.lock().push(status.connection_type);
                }
            },
            None,
        );
    }
    manager.subscribe(EventType::Refresh, |_event: &SyncEvent| {}, None);
    assert_eq!(registry.subscription_count(), 2);

    manager.initialize_real_time_updates();
    tokio::time::sleep(ms(10)).await;
    assert!(manager.get_connection_status().is_connected);

    manager.cleanup().await;
    manager.cleanup().await;

    assert_eq!(manager.get_connection_status(), ConnectionStatus::disconnected());
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    assert_eq!(registry.subscription_count(), 1);
    assert_eq!(
        *changes.lock(),
        vec![ConnectionType::Live, ConnectionType::Disconnected]
    );

    // Nothing fires after teardown
    tokio::time::sleep(ms(600_000)).await;
    assert_eq!(connector.connects(), 1);
    assert_eq!(poller.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_postponed_while_backend_unhealthy() {
    let probe = Arc::new(ToggleProbe {
        healthy: AtomicBool::new(false),
    });
    let health = Arc::new(HealthMonitor::new(HealthConfig::default(), probe.clone()).unwrap());
    health.start();
    tokio::time::sleep(ms(1)).await;
    assert!(!health.status().is_healthy);

    let connector = MockConnector::new(vec![], Behavior::Fail);
    let registry = Arc::new(EventRegistry::new(&EventsConfig::default()).unwrap());
    let manager = Arc::new(
        TransportManager::new(
            transport_config(5),
            Some(connector.clone() as Arc<dyn LiveConnector>),
            MockPoller::new(),
            registry,
        )
        .unwrap()
        .with_health(Arc::clone(&health)),
    );

    manager.initialize_real_time_updates();
    tokio::time::sleep(ms(10_000)).await;
    assert_eq!(connector.connects(), 1);
    assert_eq!(manager.get_connection_status().reconnect_attempts, 1);

    probe.healthy.store(true, Ordering::SeqCst);
    assert!(health.force_check().await);
    tokio::time::sleep(ms(1000)).await;
    assert_eq!(connector.connects(), 2);

    manager.cleanup().await;
    health.stop();
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_flushes_then_releases_batch_subscriptions() {
    let (manager, registry) = build(transport_config(5), None, MockPoller::new());
    let batches = Arc::new(Mutex::new(Vec::new()));
    {
        let batches = Arc::clone(&batches);
        manager.subscribe_batch(
            EventType::ActivityLogged,
            move |_event_type: EventType, batch: &[SyncEvent]| batches.lock().push(batch.len()),
        );
    }
    assert_eq!(registry.subscription_count(), 1);

    manager.initialize_real_time_updates();
    registry.ingest_raw(
        r#"{"type":"activity.logged","timestamp":"2024-05-01T12:00:00Z","data":{"action":"opened"}}"#,
    )
    .unwrap();
    assert_eq!(registry.buffered_len(EventType::ActivityLogged), 1);

    assert_eq!(manager.cleanup().await, 1);
    assert_eq!(*batches.lock(), vec![1]);
    assert_eq!(registry.subscription_count(), 0);
    assert_eq!(manager.cleanup().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_poll_refresh_in_flight_completes_before_live_takes_over() {
    let connector = MockConnector::new(vec![Behavior::Fail], Behavior::OpenForever);
    let config = TransportConfig {
        poll_interval_ms: 30_000,
        reconnect_base_delay_ms: 50,
        ..transport_config(5)
    };
    let (manager, registry) = build(config, Some(Arc::clone(&connector)), MockPoller::new());

    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    {
        let log = Arc::clone(&log);
        let manager_ref = Arc::downgrade(&manager);
        registry.subscribe(
            EventType::Refresh,
            move |_event: &SyncEvent| {
                // Hold delivery across the reconnect at +50ms
                std::thread::sleep(Duration::from_millis(300));
                if let Some(manager) = manager_ref.upgrade() {
                    log.lock().push(format!(
                        "refresh connected={}",
                        manager.get_connection_status().is_connected
                    ));
                }
            },
            None,
        );
    }
    {
        let log = Arc::clone(&log);
        registry.subscribe(
            EventType::ConnectionChanged,
            move |event: &SyncEvent| {
                if let EventPayload::ConnectionChanged(status) = &event.payload {
                    if status.connection_type == ConnectionType::Live {
                        log.lock().push("live".to_string());
                    }
                }
            },
            None,
        );
    }

    manager.initialize_real_time_updates();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(connector.connects(), 2);
    assert_eq!(
        manager.get_connection_status(),
        status(true, ConnectionType::Live, 0)
    );
    assert_eq!(
        *log.lock(),
        vec!["refresh connected=false".to_string(), "live".to_string()]
    );

    manager.cleanup().await;
}
