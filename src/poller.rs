//! The polling loop.
//!
//! A [`Poller`] fetches a snapshot immediately on start, then schedules
//! exactly one follow-up fetch after each completion, success or failure.
//! Successful snapshots are published on a `watch` channel, replacing the
//! previous one. Failures are logged and counted but never stop the loop.
//!
//! Only one request is ever in flight: the next fetch is scheduled only
//! after the previous one has finished or timed out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data_sources::SnapshotSource;
use crate::data_sources::gateway::DEFAULT_FETCH_TIMEOUT;
use crate::error::FetchError;
use crate::model::Snapshot;

/// Default delay between the end of one fetch and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);

/// Latest published snapshot; `None` until the first successful poll.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<Snapshot>>>;

/// Health of the polling loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    /// Whether a poll loop is currently active.
    pub running: bool,

    /// Fetches attempted since the poller was created.
    pub attempts: u64,

    /// Fetches that produced a snapshot.
    pub successes: u64,

    /// Failures since the last success.
    pub consecutive_failures: u64,

    /// When the last snapshot was published.
    pub last_success: Option<DateTime<Utc>>,

    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
}

struct ActiveLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the poll cadence for one snapshot source.
///
/// The poller can be started and stopped repeatedly. Stopping cancels the
/// pending scheduled fetch and abandons any fetch still in flight; its
/// result is never published.
pub struct Poller<S: SnapshotSource> {
    source: Arc<S>,
    interval: Duration,
    fetch_timeout: Duration,
    snapshot_tx: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    status_tx: Arc<watch::Sender<PollStatus>>,
    active: Option<ActiveLoop>,
}

impl<S: SnapshotSource> Poller<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(PollStatus::default());

        Self {
            source: Arc::new(source),
            interval,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            snapshot_tx: Arc::new(snapshot_tx),
            status_tx: Arc::new(status_tx),
            active: None,
        }
    }

    /// Bound every fetch to `timeout`. A fetch that overruns counts as a
    /// transport failure.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to poll health updates.
    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start polling. The first fetch is issued immediately.
    ///
    /// Starting an already running poller does nothing.
    pub fn start(&mut self) {
        if self.active.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            self.interval,
            self.fetch_timeout,
            Arc::clone(&self.snapshot_tx),
            Arc::clone(&self.status_tx),
            token.clone(),
        ));

        self.active = Some(ActiveLoop { token, task });
    }

    /// Stop polling and wait for the loop to wind down.
    ///
    /// Once this returns no further fetch is issued and nothing else is
    /// published until the next [`Poller::start`].
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.token.cancel();
        if let Err(e) = active.task.await {
            warn!(error = %e, "Poll task ended abnormally");
        }
    }
}

impl<S: SnapshotSource> Drop for Poller<S> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.token.cancel();
        }
    }
}

async fn poll_loop<S: SnapshotSource>(
    source: Arc<S>,
    interval: Duration,
    fetch_timeout: Duration,
    snapshot_tx: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    status_tx: Arc<watch::Sender<PollStatus>>,
    token: CancellationToken,
) {
    let description = source.describe();
    info!(
        source = %description,
        interval_ms = interval.as_millis() as u64,
        "Polling started"
    );
    status_tx.send_modify(|status| status.running = true);

    loop {
        // Counted only once the fetch is actually polled.
        let fetch = async {
            status_tx.send_modify(|status| status.attempts += 1);
            tokio::time::timeout(fetch_timeout, source.fetch()).await
        };

        let outcome = tokio::select! {
            biased;

            _ = token.cancelled() => break,

            outcome = fetch => outcome,
        };

        // A fetch that raced with cancellation is discarded.
        if token.is_cancelled() {
            break;
        }

        let result = outcome.unwrap_or_else(|_| {
            Err(FetchError::Transport(format!(
                "timed out after {}ms",
                fetch_timeout.as_millis()
            )))
        });

        match result {
            Ok(snapshot) => {
                debug!(sensor_count = snapshot.len(), "Snapshot received");
                snapshot_tx.send_replace(Some(Arc::new(snapshot)));
                status_tx.send_modify(|status| {
                    status.successes += 1;
                    status.consecutive_failures = 0;
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                });
            }
            Err(e) => {
                let mut failures = 0;
                status_tx.send_modify(|status| {
                    status.consecutive_failures += 1;
                    status.last_error = Some(e.to_string());
                    failures = status.consecutive_failures;
                });
                warn!(
                    source = %description,
                    kind = e.kind(),
                    error = %e,
                    consecutive_failures = failures,
                    "Snapshot fetch failed; keeping last snapshot"
                );
            }
        }

        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = tokio::time::sleep(interval) => {}
        }
    }

    status_tx.send_modify(|status| status.running = false);
    info!(source = %description, "Polling stopped");
}
