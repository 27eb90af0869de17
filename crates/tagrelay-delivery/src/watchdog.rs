//! Connection watchdog.
//!
//! Periodically probes the delivery channel and reconnects it when the
//! probe fails, backing off exponentially once failures pile up. The
//! watchdog is the only component that counts failures: the channel
//! reports health, the watchdog decides what a failure means.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tagrelay_core::constants::{
    WATCHDOG_BACKOFF_MULTIPLIER, WATCHDOG_BASE_INTERVAL_MS, WATCHDOG_MAX_BACKOFF_MS,
    WATCHDOG_MAX_CONSECUTIVE_FAILURES, WATCHDOG_RECONNECT_GRACE_MS,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::ServerDiscovery;

/// Connection surface the watchdog supervises.
///
/// [`crate::DeliveryChannel`] is the production implementor; tests script
/// their own. Returned futures are `Send` so the watchdog can await them
/// from a spawned task.
pub trait Supervised: Send + Sync {
    /// Cheap state check, no I/O.
    fn is_connected(&self) -> bool;

    /// Deeper probe that exercises the transport.
    fn check_connection(&self) -> impl Future<Output = bool> + Send;

    /// Tear down and re-establish against the given servers.
    fn reconnect(&self, servers: &[String]) -> impl Future<Output = bool> + Send;
}

/// Watchdog timing knobs. Defaults come from the crate-wide constants.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Interval between health checks while the connection is good.
    pub base_interval: Duration,

    /// Per-failure growth factor once past the failure threshold.
    pub multiplier: f64,

    /// Ceiling on the check interval regardless of failure count.
    pub max_backoff: Duration,

    /// Failures tolerated at the base interval before backoff engages.
    pub max_consecutive_failures: u32,

    /// Settle time after a reconnect before re-probing.
    pub reconnect_grace: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(WATCHDOG_BASE_INTERVAL_MS),
            multiplier: WATCHDOG_BACKOFF_MULTIPLIER,
            max_backoff: Duration::from_millis(WATCHDOG_MAX_BACKOFF_MS),
            max_consecutive_failures: WATCHDOG_MAX_CONSECUTIVE_FAILURES,
            reconnect_grace: Duration::from_millis(WATCHDOG_RECONNECT_GRACE_MS),
        }
    }
}

/// Lifecycle phase of the watchdog task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Snapshot of the watchdog's bookkeeping, readable at any time.
#[derive(Debug, Clone)]
pub struct WatchdogState {
    pub phase: WatchdogPhase,
    pub consecutive_failures: u32,
    pub next_check_delay: Duration,
    /// When the most recent health check completed, if any.
    pub last_check_at: Option<Instant>,
    pub is_paused: bool,
}

struct Bookkeeping {
    phase: WatchdogPhase,
    consecutive_failures: u32,
    next_check_delay: Duration,
    last_check_at: Option<Instant>,
    is_paused: bool,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Supervises a [`Supervised`] connection, reconnecting through a
/// [`ServerDiscovery`] source with capped exponential backoff.
pub struct ConnectionWatchdog<S, D> {
    connection: Arc<S>,
    discovery: Arc<D>,
    config: WatchdogConfig,
    inner: Arc<Mutex<Bookkeeping>>,
}

impl<S, D> ConnectionWatchdog<S, D>
where
    S: Supervised + 'static,
    D: ServerDiscovery + 'static,
{
    #[must_use]
    pub fn new(connection: Arc<S>, discovery: Arc<D>, config: WatchdogConfig) -> Self {
        let next_check_delay = config.base_interval;
        Self {
            connection,
            discovery,
            config,
            inner: Arc::new(Mutex::new(Bookkeeping {
                phase: WatchdogPhase::Stopped,
                consecutive_failures: 0,
                next_check_delay,
                last_check_at: None,
                is_paused: false,
                shutdown: None,
                task: None,
            })),
        }
    }

    /// Current bookkeeping snapshot.
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        WatchdogState {
            phase: inner.phase,
            consecutive_failures: inner.consecutive_failures,
            next_check_delay: inner.next_check_delay,
            last_check_at: inner.last_check_at,
            is_paused: inner.is_paused,
        }
    }

    /// Pause or resume health checking. A paused watchdog keeps ticking at
    /// the base interval but skips the probe and the reconnect.
    pub fn set_paused(&self, paused: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.is_paused = paused;
    }

    /// Start the supervision loop. Idempotent: a second start while the
    /// loop is alive is a no-op.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(inner.phase, WatchdogPhase::Stopped) {
            debug!("watchdog already running");
            return;
        }
        inner.phase = WatchdogPhase::Starting;
        inner.consecutive_failures = 0;
        inner.next_check_delay = self.config.base_interval;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        inner.shutdown = Some(shutdown_tx);
        inner.task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.connection),
            Arc::clone(&self.discovery),
            self.config.clone(),
            Arc::clone(&self.inner),
            shutdown_rx,
        )));
        inner.phase = WatchdogPhase::Running;
        info!("connection watchdog started");
    }

    /// Stop the supervision loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let (shutdown, task) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(inner.phase, WatchdogPhase::Stopped | WatchdogPhase::Stopping) {
                return;
            }
            inner.phase = WatchdogPhase::Stopping;
            (inner.shutdown.take(), inner.task.take())
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(task) = task {
            let _ = task.await;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.phase = WatchdogPhase::Stopped;
        info!("connection watchdog stopped");
    }
}

/// Delay before the next check given the failure count so far.
///
/// Failures up to the threshold keep the base interval; each failure past
/// it multiplies the delay, clamped at the ceiling.
fn next_delay(config: &WatchdogConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures <= config.max_consecutive_failures {
        return config.base_interval;
    }
    let excess = consecutive_failures - config.max_consecutive_failures;
    let scaled = config.base_interval.as_millis() as f64 * config.multiplier.powi(excess as i32);
    let capped = scaled.min(config.max_backoff.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

async fn run_loop<S, D>(
    connection: Arc<S>,
    discovery: Arc<D>,
    config: WatchdogConfig,
    inner: Arc<Mutex<Bookkeeping>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Supervised,
    D: ServerDiscovery,
{
    // Last non-empty discovery answer; reused when discovery goes dark.
    let mut last_servers: Vec<String> = Vec::new();
    loop {
        let (delay, paused) = {
            let inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            let delay = if inner.is_paused {
                config.base_interval
            } else {
                inner.next_check_delay
            };
            (delay, inner.is_paused)
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                debug!("watchdog loop shutting down");
                return;
            }
        }

        if paused || inner.lock().unwrap_or_else(|e| e.into_inner()).is_paused {
            continue;
        }

        let healthy = connection.is_connected()
            && connection.check_connection().await
            && connection.is_connected();

        if healthy {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.last_check_at = Some(Instant::now());
            if inner.consecutive_failures > 0 {
                info!(
                    failures = inner.consecutive_failures,
                    "connection recovered"
                );
            }
            inner.consecutive_failures = 0;
            inner.next_check_delay = config.base_interval;
            continue;
        }

        // The single place failures are counted; the reconnect below does
        // not count on its own.
        let failures = {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.last_check_at = Some(Instant::now());
            inner.consecutive_failures += 1;
            inner.next_check_delay = next_delay(&config, inner.consecutive_failures);
            inner.consecutive_failures
        };
        warn!(failures, "connection unhealthy, reconnecting");

        let servers = discovery.best_servers().await;
        if servers.is_empty() {
            debug!("discovery returned no servers, using last-known list");
        } else {
            last_servers = servers;
        }
        if connection.reconnect(&last_servers).await {
            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_grace) => {}
                _ = shutdown.changed() => return,
            }
            if connection.is_connected() {
                let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.consecutive_failures = 0;
                inner.next_check_delay = config.base_interval;
                info!("reconnect succeeded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, multiplier: f64, max_ms: u64, threshold: u32) -> WatchdogConfig {
        WatchdogConfig {
            base_interval: Duration::from_millis(base_ms),
            multiplier,
            max_backoff: Duration::from_millis(max_ms),
            max_consecutive_failures: threshold,
            reconnect_grace: Duration::from_millis(0),
        }
    }

    #[test]
    fn delay_stays_at_base_until_threshold() {
        let cfg = config(30_000, 2.0, 600_000, 3);
        for failures in 0..=3 {
            assert_eq!(next_delay(&cfg, failures), Duration::from_millis(30_000));
        }
    }

    #[test]
    fn delay_doubles_past_threshold() {
        let cfg = config(30_000, 2.0, 600_000, 3);
        assert_eq!(next_delay(&cfg, 4), Duration::from_millis(60_000));
        assert_eq!(next_delay(&cfg, 5), Duration::from_millis(120_000));
        assert_eq!(next_delay(&cfg, 6), Duration::from_millis(240_000));
    }

    #[test]
    fn delay_is_clamped_at_max_backoff() {
        let cfg = config(30_000, 2.0, 600_000, 3);
        assert_eq!(next_delay(&cfg, 20), Duration::from_millis(600_000));
        assert_eq!(next_delay(&cfg, 200), Duration::from_millis(600_000));
    }

    #[test]
    fn delay_never_decreases_with_more_failures() {
        let cfg = config(30_000, 1.5, 600_000, 2);
        let mut previous = Duration::ZERO;
        for failures in 0..30 {
            let delay = next_delay(&cfg, failures);
            assert!(delay >= previous, "delay shrank at failure {failures}");
            previous = delay;
        }
    }
}
