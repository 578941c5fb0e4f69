//! Live monitoring state.
//!
//! [`MonitorState`] holds everything that changes during a session: the
//! last good snapshot and the alert deduplicator. It is only mutated through
//! [`MonitorState::apply`] (a new snapshot arrived) and
//! [`MonitorState::dismiss`] (the operator acknowledged an alert).
//!
//! [`Monitor`] is the shared handle used by the HTTP layer and by the task
//! that consumes the poller's snapshots.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerting::{AlertDeduplicator, Presentation};
use crate::classifier::{DEFAULT_STALE_AFTER, alarming_ids, classify};
use crate::layout::Layout;
use crate::model::{
    AlertRecord, AlertView, Classification, Dismissal, FloorView, MarkerView, Snapshot,
    display_label,
};
use crate::poller::SnapshotReceiver;

/// Default snooze after the operator confirms an alert (10 minutes).
pub const DEFAULT_CONFIRM_COOLDOWN: TimeDelta = TimeDelta::milliseconds(600_000);

/// Default snooze after the operator cancels an alert (1 minute).
pub const DEFAULT_CANCEL_COOLDOWN: TimeDelta = TimeDelta::milliseconds(60_000);

/// Classification and alerting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub stale_after: TimeDelta,
    pub confirm_cooldown: TimeDelta,
    pub cancel_cooldown: TimeDelta,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            confirm_cooldown: DEFAULT_CONFIRM_COOLDOWN,
            cancel_cooldown: DEFAULT_CANCEL_COOLDOWN,
        }
    }
}

impl MonitorSettings {
    /// Cooldown applied by a dismissal action.
    pub fn cooldown(&self, dismissal: Dismissal) -> TimeDelta {
        match dismissal {
            Dismissal::Confirm => self.confirm_cooldown,
            Dismissal::Cancel => self.cancel_cooldown,
        }
    }
}

/// Session state: last good snapshot plus alert deduplication.
#[derive(Debug)]
pub struct MonitorState {
    settings: MonitorSettings,
    snapshot: Option<Arc<Snapshot>>,
    alerts: AlertDeduplicator,
}

impl MonitorState {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            snapshot: None,
            alerts: AlertDeduplicator::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// Replace the current snapshot and run alert deduplication on it.
    pub fn apply(&mut self, snapshot: Arc<Snapshot>, now: DateTime<Utc>) -> Presentation {
        let ids = alarming_ids(&snapshot, now, self.settings.stale_after);
        self.snapshot = Some(snapshot);
        self.alerts.observe(ids, now)
    }

    /// Acknowledge the presented alert. Returns the new record, or `None`
    /// if nothing was being presented.
    pub fn dismiss(&mut self, dismissal: Dismissal, now: DateTime<Utc>) -> Option<AlertRecord> {
        let cooldown = self.settings.cooldown(dismissal);
        self.alerts.dismiss(cooldown, now).cloned()
    }

    /// Clear the presentation once none of the presented ids still
    /// classifies as an alarm at `now`, e.g. because polls kept failing and
    /// the readings went stale. The record is kept. Returns whether the
    /// presentation was cleared.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.alerts.is_presenting() {
            return false;
        }

        let still_alarming = self
            .alerts
            .presented()
            .iter()
            .any(|id| self.classification(id, now) == Some(Classification::Alarm));
        if still_alarming {
            return false;
        }

        self.alerts.observe(Vec::new(), now);
        true
    }

    /// Classification of `id` at `now`; `None` when the snapshot has no
    /// reading for it (or there is no snapshot yet).
    pub fn classification(&self, id: &str, now: DateTime<Utc>) -> Option<Classification> {
        let reading = self.snapshot.as_ref()?.get(id)?;
        Some(classify(reading, now, self.settings.stale_after))
    }

    /// Whether `id` is part of the alarm set currently presented.
    pub fn is_presented(&self, id: &str) -> bool {
        self.alerts.is_presented(id)
    }

    /// Per-floor marker facts for the renderer.
    pub fn markers(&self, layout: &Layout, now: DateTime<Utc>) -> Vec<FloorView> {
        layout
            .floors()
            .iter()
            .map(|floor| FloorView {
                name: floor.name.clone(),
                asset: floor.asset.clone(),
                markers: floor
                    .positions
                    .iter()
                    .map(|(id, position)| MarkerView {
                        id: id.clone(),
                        label: display_label(id),
                        position: *position,
                        classification: self.classification(id, now),
                        alerting: self.is_presented(id),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn alert_view(&self) -> AlertView {
        let sensors = self.alerts.presented().to_vec();
        AlertView {
            active: !sensors.is_empty(),
            labels: sensors.iter().map(|id| display_label(id)).collect(),
            sensors,
            last_dismissed: self.alerts.record().cloned(),
        }
    }
}

/// Shared handle to the monitoring state.
#[derive(Clone)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState::new(settings))),
        }
    }

    /// Apply a freshly published snapshot.
    pub async fn apply(&self, snapshot: Arc<Snapshot>, now: DateTime<Utc>) -> Presentation {
        let presentation = self.state.lock().await.apply(snapshot, now);

        match &presentation {
            Presentation::Triggered(ids) => {
                warn!(sensors = ?ids, "Water leak alarm raised");
            }
            Presentation::Refreshed(ids) => {
                warn!(sensors = ?ids, "Water leak alarm set changed");
            }
            Presentation::Suppressed => {
                debug!("Alarm set unchanged since dismissal; still snoozed");
            }
            Presentation::Idle | Presentation::Unchanged => {}
        }

        presentation
    }

    /// Lock the state with any presentation that went stale by `now` cleared.
    async fn current(&self, now: DateTime<Utc>) -> MutexGuard<'_, MonitorState> {
        let mut state = self.state.lock().await;
        if state.expire(now) {
            info!("Presented alarms no longer current; alert cleared");
        }
        state
    }

    /// Handle an operator dismissal.
    pub async fn dismiss(&self, dismissal: Dismissal, now: DateTime<Utc>) -> AlertView {
        let mut state = self.current(now).await;

        match state.dismiss(dismissal, now) {
            Some(record) => info!(
                signature = %record.signature,
                action = ?dismissal,
                cooldown_ms = record.cooldown.num_milliseconds(),
                "Alert dismissed"
            ),
            None => debug!(action = ?dismissal, "Dismissal with no alert presented"),
        }

        state.alert_view()
    }

    pub async fn alert_view(&self, now: DateTime<Utc>) -> AlertView {
        self.current(now).await.alert_view()
    }

    pub async fn markers(&self, layout: &Layout, now: DateTime<Utc>) -> Vec<FloorView> {
        self.current(now).await.markers(layout, now)
    }

    pub async fn classification(&self, id: &str, now: DateTime<Utc>) -> Option<Classification> {
        self.state.lock().await.classification(id, now)
    }

    /// Consume snapshots from the poller until `token` is cancelled or the
    /// poller goes away.
    pub fn spawn(&self, mut snapshots: SnapshotReceiver, token: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            let initial = snapshots.borrow_and_update().clone();
            if let Some(snapshot) = initial {
                monitor.apply(snapshot, Utc::now()).await;
            }

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            info!("Snapshot channel closed");
                            break;
                        }
                        let latest = snapshots.borrow_and_update().clone();
                        if let Some(snapshot) = latest {
                            monitor.apply(snapshot, Utc::now()).await;
                        }
                    }
                }
            }
        })
    }
}
