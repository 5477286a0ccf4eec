use super::probe::HealthProbe;
use super::types::{HealthStatus, ProbeResult};
use crate::backoff::BackoffPolicy;
use crate::config::HealthConfig;
use crate::errors::ConfigError;
use crate::logger::{self, LogTag};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked after every completed probe
pub type HealthListener = Arc<dyn Fn(&HealthStatus) + Send + Sync>;

/// Handle returned by `add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ProbeFuture = Shared<BoxFuture<'static, ProbeResult>>;

struct MonitorState {
    status: HealthStatus,
    /// Monotonic time of the last completed probe (staleness check)
    checked_at: Instant,
    /// Consecutive successes while still unhealthy
    recovery_streak: u32,
    /// The probe currently running, shared by every caller that wants one
    inflight: Option<(u64, ProbeFuture)>,
    probe_seq: u64,
    task: Option<JoinHandle<()>>,
    /// Bumped on stop/reset so an old loop never touches state again
    generation: u64,
}

/// Periodic liveness monitor for one backend
///
/// Construct with [`HealthMonitor::new`], share as `Arc<HealthMonitor>`.
/// All probes, scheduled or forced, go through a single in-flight slot, so
/// at most one network call is outstanding at any time.
pub struct HealthMonitor {
    config: HealthConfig,
    policy: BackoffPolicy,
    probe: Arc<dyn HealthProbe>,
    state: Mutex<MonitorState>,
    listeners: Mutex<Vec<(ListenerId, HealthListener)>>,
    next_listener_id: AtomicU64,
}

impl HealthMonitor {
    /// Build a monitor; fails fast on an invalid configuration
    pub fn new(config: HealthConfig, probe: Arc<dyn HealthProbe>) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = BackoffPolicy::new(
            config.check_interval(),
            config.max_interval(),
            config.failure_threshold,
        );

        Ok(Self {
            config,
            policy,
            probe,
            state: Mutex::new(MonitorState {
                status: HealthStatus::initial(),
                checked_at: Instant::now(),
                recovery_streak: 0,
                inflight: None,
                probe_seq: 0,
                task: None,
                generation: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn target(&self) -> &str {
        self.probe.target()
    }

    /// Begin periodic probing; the first probe runs immediately
    ///
    /// Returns `false` (and does nothing) if already started. Must be called
    /// from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.task.is_some() {
            return false;
        }

        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(self);
        state.task = Some(tokio::spawn(run_probe_loop(weak, generation)));
        drop(state);

        logger::info(
            LogTag::Health,
            &format!(
                "Health monitor started for {} (base={}ms, max={}ms, threshold={})",
                self.probe.target(),
                self.config.check_interval_ms,
                self.config.max_interval_ms,
                self.config.failure_threshold
            ),
        );
        true
    }

    /// Cancel the scheduled probing; status is retained
    pub fn stop(&self) {
        let task = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.task.take()
        };

        if let Some(task) = task {
            task.abort();
            logger::info(
                LogTag::Health,
                &format!("Health monitor stopped for {}", self.probe.target()),
            );
        }
    }

    /// Stop, then restore the optimistic initial status
    pub fn reset(&self) {
        self.stop();
        let mut state = self.state.lock();
        state.status = HealthStatus::initial();
        state.checked_at = Instant::now();
        state.recovery_streak = 0;
        // A probe still running belongs to the old lifecycle; its result is dropped
        state.inflight = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().task.is_some()
    }

    /// Probe now and return the resulting health
    ///
    /// Joins the probe already in flight (scheduled or forced) instead of
    /// starting another one.
    pub async fn force_check(&self) -> bool {
        let (probe_id, future) = {
            let mut state = self.state.lock();
            match &state.inflight {
                Some((id, future)) => (*id, future.clone()),
                None => {
                    state.probe_seq += 1;
                    let id = state.probe_seq;
                    let future = self.probe_future();
                    state.inflight = Some((id, future.clone()));
                    (id, future)
                }
            }
        };

        let result = future.await;
        self.complete_probe(probe_id, &result);
        result.healthy
    }

    /// True only if the last probe succeeded and is not older than the
    /// current check interval
    pub fn is_backend_healthy(&self) -> bool {
        let state = self.state.lock();
        let interval = self.policy.delay(state.status.consecutive_failures);
        state.status.is_healthy && state.checked_at.elapsed() < interval
    }

    pub fn status(&self) -> HealthStatus {
        self.state.lock().status.clone()
    }

    /// Interval until the next scheduled probe, given the current failures
    pub fn current_interval(&self) -> Duration {
        let failures = self.state.lock().status.consecutive_failures;
        self.policy.delay(failures)
    }

    pub fn add_listener(&self, listener: HealthListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns `false` if the listener was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn probe_future(&self) -> ProbeFuture {
        let probe = Arc::clone(&self.probe);
        let timeout = self.config.probe_timeout();
        let timeout_ms = self.config.probe_timeout_ms;

        async move {
            match tokio::time::timeout(timeout, probe.probe()).await {
                Ok(result) => result,
                Err(_) => ProbeResult::failure(format!("Timeout after {}ms", timeout_ms)),
            }
        }
        .boxed()
        .shared()
    }

    /// Apply a finished probe; only the first caller for a given probe wins
    fn complete_probe(&self, probe_id: u64, result: &ProbeResult) {
        let (snapshot, was_healthy) = {
            let mut state = self.state.lock();
            match &state.inflight {
                Some((id, _)) if *id == probe_id => {}
                _ => return,
            }
            state.inflight = None;

            let was_healthy = state.status.is_healthy;
            self.apply_result(&mut state, result);
            (state.status.clone(), was_healthy)
        };

        self.log_probe(&snapshot, was_healthy);
        self.notify_listeners(&snapshot);
    }

    fn apply_result(&self, state: &mut MonitorState, result: &ProbeResult) {
        let status = &mut state.status;

        if result.healthy {
            if status.is_healthy {
                // Slow decay while healthy
                status.consecutive_failures = status.consecutive_failures.saturating_sub(1);
            } else {
                state.recovery_streak += 1;
                if state.recovery_streak >= self.config.success_threshold {
                    status.is_healthy = true;
                    status.consecutive_failures = 0;
                    state.recovery_streak = 0;
                }
            }
            status.last_response_time_ms = Some(result.latency_ms);
            status.last_error = None;
        } else {
            status.is_healthy = false;
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            status.last_response_time_ms = None;
            status.last_error = result.error.clone();
            state.recovery_streak = 0;
        }

        let interval = self.policy.delay(status.consecutive_failures);
        let now = chrono::Utc::now();
        status.last_check_at = now;
        status.next_check_at =
            now + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
        state.checked_at = Instant::now();
    }

    fn log_probe(&self, status: &HealthStatus, was_healthy: bool) {
        let interval_ms = self.policy.delay(status.consecutive_failures).as_millis();

        match (was_healthy, status.is_healthy) {
            (true, false) => logger::warning(
                LogTag::Health,
                &format!(
                    "Backend {} became unhealthy: {} (next check in {}ms)",
                    self.probe.target(),
                    status.last_error.as_deref().unwrap_or("unknown error"),
                    interval_ms
                ),
            ),
            (false, true) => logger::info(
                LogTag::Health,
                &format!("Backend {} recovered", self.probe.target()),
            ),
            _ => logger::debug(
                LogTag::Health,
                &format!(
                    "Probe {}: healthy={} failures={} latency={:?} next={}ms",
                    self.probe.target(),
                    status.is_healthy,
                    status.consecutive_failures,
                    status.last_response_time_ms,
                    interval_ms
                ),
            ),
        }
    }

    fn notify_listeners(&self, status: &HealthStatus) {
        let listeners: Vec<HealthListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                logger::error(LogTag::Health, "Health listener panicked; continuing");
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}

async fn run_probe_loop(monitor: Weak<HealthMonitor>, generation: u64) {
    loop {
        let interval = {
            let Some(monitor) = monitor.upgrade() else {
                break;
            };
            if !monitor.is_current(generation) {
                break;
            }
            monitor.force_check().await;
            monitor.current_interval()
        };

        tokio::time::sleep(interval).await;
    }
}
