//! Data models for Leakwatch.
//!
//! Everything here is in-memory only. Snapshots are replaced wholesale on
//! every successful poll and the alert record lives for the session.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One sensor's latest reading as reported by the relay.
///
/// Wire shape: `{ "gateway": "241", "value": 1, "time": 1718000000000 }`.
/// `value` and `time` accept any JSON number; fractions are truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Relay/gateway that reported this reading. Informational only.
    pub gateway: String,

    /// `0` means dry, anything else means water was detected.
    #[serde(deserialize_with = "deserialize_truncated")]
    pub value: i64,

    /// Epoch milliseconds at which the reading was produced upstream.
    #[serde(deserialize_with = "deserialize_truncated")]
    pub time: i64,
}

/// Integer value of a JSON number, truncating toward zero.
///
/// Out-of-range floats saturate at the `i64` bounds.
pub fn truncate_number(number: &serde_json::Number) -> Option<i64> {
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
}

fn deserialize_truncated<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    truncate_number(&number)
        .ok_or_else(|| serde::de::Error::custom(format!("number {number} out of range")))
}

impl SensorReading {
    pub fn new(gateway: &str, value: i64, time: i64) -> Self {
        Self {
            gateway: gateway.to_string(),
            value,
            time,
        }
    }

    /// Get the observation time as a DateTime.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }
}

/// The complete set of readings produced by one successful poll.
///
/// Serialized as a plain JSON object keyed by sensor id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    readings: HashMap<String, SensorReading>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&SensorReading> {
        self.readings.get(id)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SensorReading)> {
        self.readings.iter()
    }
}

impl FromIterator<(String, SensorReading)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, SensorReading)>>(iter: I) -> Self {
        Self {
            readings: iter.into_iter().collect(),
        }
    }
}

/// Derived per-sensor status consumed by the renderer and the alert pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Fresh reading, no water.
    Normal,

    /// Fresh reading, water detected.
    Alarm,

    /// Reading older than the staleness threshold; its value is not trusted.
    Stale,
}

/// Deduplication state for the last dismissed alarm set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRecord {
    /// Sorted alarming ids joined by `,`.
    pub signature: String,

    /// When the alarm set was dismissed.
    pub shown_at: DateTime<Utc>,

    /// How long the same signature stays suppressed after `shown_at`.
    #[serde(rename = "cooldown_ms", serialize_with = "serialize_millis")]
    pub cooldown: TimeDelta,
}

impl AlertRecord {
    /// Whether `signature` is still being suppressed at `now`.
    pub fn suppresses(&self, signature: &str, now: DateTime<Utc>) -> bool {
        self.signature == signature && now - self.shown_at < self.cooldown
    }
}

fn serialize_millis<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(delta.num_milliseconds())
}

/// How the operator acknowledged an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dismissal {
    /// Acknowledged; snoozes the same alarm set for the long cooldown.
    Confirm,

    /// Closed; snoozes the same alarm set for the short cooldown.
    Cancel,
}

/// Operator-facing name of a sensor: its id without the leading slot prefix.
pub fn display_label(id: &str) -> String {
    id.chars().skip(1).collect()
}

/// One marker as seen by the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerView {
    pub id: String,

    pub label: String,

    /// Placement on the floor plan, `[x, y, z]`.
    pub position: [f64; 3],

    /// `None` when the current snapshot has no reading for this sensor.
    pub classification: Option<Classification>,

    /// Whether this sensor is part of the alarm set being presented.
    pub alerting: bool,
}

/// Markers for one floor.
#[derive(Debug, Clone, Serialize)]
pub struct FloorView {
    pub name: String,

    /// Floor-plan image the renderer should texture.
    pub asset: String,

    pub markers: Vec<MarkerView>,
}

/// Response for GET /api/markers.
#[derive(Debug, Clone, Serialize)]
pub struct MarkersResponse {
    /// Instant used for classification.
    pub timestamp: DateTime<Utc>,

    pub floors: Vec<FloorView>,
}

/// Response for GET /api/alert and the dismissal endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    /// Whether an alert is currently being presented.
    pub active: bool,

    /// Presented sensor ids, sorted.
    pub sensors: Vec<String>,

    /// Display labels for `sensors`, same order.
    pub labels: Vec<String>,

    /// The last dismissal, if any.
    pub last_dismissed: Option<AlertRecord>,
}
