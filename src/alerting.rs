//! Alert deduplication and snoozing.
//!
//! The deduplicator decides, for each new set of alarming sensors, whether
//! the operator should be shown an alert. Suppression is keyed on the
//! content of the alarm set: the same set dismissed within its cooldown
//! stays quiet, while any different set interrupts the cooldown at once.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::AlertRecord;

/// Canonical, order-independent signature of an alarm set.
pub fn signature<S: AsRef<str>>(ids: &[S]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Outcome of feeding one alarm set into the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// No alarms; nothing is presented.
    Idle,

    /// A fresh alert must be shown for these ids.
    Triggered(Vec<String>),

    /// An alert was already showing and its contents changed.
    Refreshed(Vec<String>),

    /// An alert is already showing with exactly these ids.
    Unchanged,

    /// Same alarm set as the last dismissal, still inside its cooldown.
    Suppressed,
}

/// Two-state (idle/presenting) machine over the last dismissal record.
#[derive(Debug, Default)]
pub struct AlertDeduplicator {
    record: Option<AlertRecord>,
    presented: Vec<String>,
}

impl AlertDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently presented to the operator, sorted. Empty when idle.
    pub fn presented(&self) -> &[String] {
        &self.presented
    }

    pub fn is_presenting(&self) -> bool {
        !self.presented.is_empty()
    }

    pub fn is_presented(&self, id: &str) -> bool {
        self.presented.iter().any(|p| p == id)
    }

    /// The last dismissal, kept for the whole session.
    pub fn record(&self) -> Option<&AlertRecord> {
        self.record.as_ref()
    }

    /// Feed the sorted ids currently classified as alarms.
    ///
    /// An empty set clears the presentation but keeps the record, so an
    /// identical alarm set coming back is still compared against it.
    pub fn observe(&mut self, alarm_ids: Vec<String>, now: DateTime<Utc>) -> Presentation {
        if alarm_ids.is_empty() {
            self.presented.clear();
            return Presentation::Idle;
        }

        if self.is_presenting() {
            if self.presented == alarm_ids {
                return Presentation::Unchanged;
            }
            self.presented = alarm_ids.clone();
            return Presentation::Refreshed(alarm_ids);
        }

        let sig = signature(&alarm_ids);
        if let Some(record) = &self.record {
            if record.suppresses(&sig, now) {
                return Presentation::Suppressed;
            }
        }

        self.presented = alarm_ids.clone();
        Presentation::Triggered(alarm_ids)
    }

    /// Operator acknowledged the presented alert.
    ///
    /// Records the presented set with the chosen cooldown and returns to
    /// idle. Dismissing while idle changes nothing and returns `None`.
    pub fn dismiss(&mut self, cooldown: TimeDelta, now: DateTime<Utc>) -> Option<&AlertRecord> {
        if !self.is_presenting() {
            return None;
        }

        let shown = std::mem::take(&mut self.presented);
        self.record = Some(AlertRecord {
            signature: signature(&shown),
            shown_at: now,
            cooldown,
        });
        self.record.as_ref()
    }
}
