//! Periodic liveness pings for an active test run.
//!
//! At most one ping is scheduled or in flight at a time. Ending the service
//! stops future pings but lets the currently scheduled one complete, and
//! [`TestRunHeartbeatService::end`] only returns after it has.

use crate::auto_api::AutoApiBackend;
use crate::errors::ApiError;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Called with the error of a failed ping. The schedule halts after a failure.
pub type HeartbeatErrorObserver = Arc<dyn Fn(&ApiError) + Send + Sync>;

pub struct TestRunHeartbeatService {
    run_id: u64,
    api: Arc<dyn AutoApiBackend>,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    next_heartbeat: Mutex<Option<JoinHandle<()>>>,
    on_error: Option<HeartbeatErrorObserver>,
}

impl TestRunHeartbeatService {
    pub fn new(run_id: u64, api: Arc<dyn AutoApiBackend>) -> Self {
        Self {
            run_id,
            api,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            enabled: Arc::new(AtomicBool::new(false)),
            next_heartbeat: Mutex::new(None),
            on_error: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_observer(mut self, observer: HeartbeatErrorObserver) -> Self {
        self.on_error = Some(observer);
        self
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Start sending heartbeats, replacing any schedule left from an earlier start.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&self) {
        self.end().await;

        self.enabled.store(true, Ordering::SeqCst);
        let first = Instant::now() + self.interval;
        let handle = tokio::spawn(run_heartbeats(
            first,
            self.run_id,
            self.api.clone(),
            self.interval,
            self.enabled.clone(),
            self.on_error.clone(),
        ));
        if let Some(stale) = self.slot().replace(handle) {
            // Lost a race with a concurrent start.
            stale.abort();
        }
    }

    /// Stop scheduling heartbeats and wait for the pending one to finish.
    pub async fn end(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let Some(handle) = self.slot().take() else {
            return;
        };
        debug!("Ending Applause SDK Heartbeat");
        match handle.await {
            Ok(()) => debug!("Applause SDK Heartbeat Ended Successfully"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("heartbeat task failed: {e}"),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.next_heartbeat.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TestRunHeartbeatService {
    fn drop(&mut self) {
        // Dropping a JoinHandle does not cancel the task.
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }
}

async fn run_heartbeats(
    first: Instant,
    run_id: u64,
    api: Arc<dyn AutoApiBackend>,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    on_error: Option<HeartbeatErrorObserver>,
) {
    let mut next = first;
    loop {
        tokio::time::sleep_until(next).await;

        debug!("Sending heartbeat");
        if let Err(err) = api.send_sdk_heartbeat(run_id).await {
            error!("Heartbeat for test run {run_id} failed, no further heartbeats will be sent: {err}");
            enabled.store(false, Ordering::SeqCst);
            if let Some(observer) = &on_error {
                observer(&err);
            }
            return;
        }
        debug!("Heartbeat sent");

        // Re-arm only while enabled; `end` flips the flag before waiting on us.
        if !enabled.load(Ordering::SeqCst) {
            return;
        }
        next = Instant::now() + interval;
    }
}
