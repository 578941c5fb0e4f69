//! Staleness and alarm classification for sensor readings.
//!
//! Classification is a pure function of the reading, the current time and
//! the staleness threshold. A stale reading is never an alarm, so missing
//! or old data can not raise an alert on its own.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{Classification, SensorReading, Snapshot};

/// Default age after which a reading is no longer trusted (one hour).
pub const DEFAULT_STALE_AFTER: TimeDelta = TimeDelta::milliseconds(3_600_000);

/// Classify a single reading.
///
/// # Thresholds
///
/// - `stale`: `now - reading.time >= stale_after`, regardless of value
/// - `normal`: fresh and `value == 0`
/// - `alarm`: fresh and `value != 0`
pub fn classify(
    reading: &SensorReading,
    now: DateTime<Utc>,
    stale_after: TimeDelta,
) -> Classification {
    let age_ms = now.timestamp_millis().saturating_sub(reading.time);

    if age_ms >= stale_after.num_milliseconds() {
        Classification::Stale
    } else if reading.value == 0 {
        Classification::Normal
    } else {
        Classification::Alarm
    }
}

/// Sorted ids of every sensor in `snapshot` that classifies as an alarm.
pub fn alarming_ids(snapshot: &Snapshot, now: DateTime<Utc>, stale_after: TimeDelta) -> Vec<String> {
    let mut ids: Vec<String> = snapshot
        .iter()
        .filter(|(_, reading)| classify(reading, now, stale_after) == Classification::Alarm)
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(NOW_MS).unwrap()
    }

    fn reading(value: i64, age_ms: i64) -> SensorReading {
        SensorReading::new("241", value, NOW_MS - age_ms)
    }

    #[test]
    fn test_fresh_readings() {
        assert_eq!(
            classify(&reading(0, 0), now(), DEFAULT_STALE_AFTER),
            Classification::Normal
        );
        assert_eq!(
            classify(&reading(1, 0), now(), DEFAULT_STALE_AFTER),
            Classification::Alarm
        );
        // Any nonzero value counts as water
        assert_eq!(
            classify(&reading(7, 1_000), now(), DEFAULT_STALE_AFTER),
            Classification::Alarm
        );
    }

    #[test]
    fn test_staleness_dominates_value() {
        assert_eq!(
            classify(&reading(1, 3_600_000), now(), DEFAULT_STALE_AFTER),
            Classification::Stale
        );
        assert_eq!(
            classify(&reading(0, 10 * 3_600_000), now(), DEFAULT_STALE_AFTER),
            Classification::Stale
        );
        // Seeded relay slots carry time 0
        assert_eq!(
            classify(&SensorReading::new("", 0, 0), now(), DEFAULT_STALE_AFTER),
            Classification::Stale
        );
    }

    #[test]
    fn test_staleness_boundary() {
        assert_eq!(
            classify(&reading(1, 3_599_999), now(), DEFAULT_STALE_AFTER),
            Classification::Alarm
        );
        assert_eq!(
            classify(&reading(0, 3_599_999), now(), DEFAULT_STALE_AFTER),
            Classification::Normal
        );
        assert_eq!(
            classify(&reading(1, 3_600_000), now(), DEFAULT_STALE_AFTER),
            Classification::Stale
        );
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        assert_eq!(
            classify(&reading(1, -5_000), now(), DEFAULT_STALE_AFTER),
            Classification::Alarm
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let r = reading(1, 42);
        let first = classify(&r, now(), DEFAULT_STALE_AFTER);
        let second = classify(&r, now(), DEFAULT_STALE_AFTER);
        assert_eq!(first, second);
    }

    #[test]
    fn test_alarming_ids_sorted_and_filtered() {
        let snapshot: Snapshot = [
            ("k9".to_string(), reading(1, 0)),
            ("k10".to_string(), reading(1, 0)),
            ("k2".to_string(), reading(0, 0)),
            ("k3".to_string(), reading(1, 3_600_000)),
        ]
        .into_iter()
        .collect();

        let ids = alarming_ids(&snapshot, now(), DEFAULT_STALE_AFTER);
        assert_eq!(ids, vec!["k10".to_string(), "k9".to_string()]);
    }

    #[test]
    fn test_alarming_ids_empty_snapshot() {
        assert!(alarming_ids(&Snapshot::new(), now(), DEFAULT_STALE_AFTER).is_empty());
    }
}
