//! In-memory gateway relay.
//!
//! Gateways push raw readings to `POST /api/gw/{code}`. The relay keeps the
//! latest reading per sensor slot and serves the complete map at
//! `GET /api/gw`, which is what the poller reads.
//!
//! The set of slots is fixed at startup (`k1..kN`). Each slot starts with
//! an empty gateway and time 0, so until a gateway reports it the sensor
//! classifies as stale. Readings for unknown ids are ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::IngestError;
use crate::model::{SensorReading, Snapshot, truncate_number};

/// Number of sensor slots seeded by default.
pub const DEFAULT_SENSOR_COUNT: usize = 40;

/// Upper bound on configured sensor slots. All slots are allocated up front.
pub const MAX_SENSOR_COUNT: usize = 10_000;

/// Gateway codes accepted by default.
pub const DEFAULT_GATEWAYS: [&str; 5] = ["241", "242", "243", "244", "245"];

/// Latest reading per sensor slot.
#[derive(Clone)]
pub struct GatewayCache {
    readings: Arc<RwLock<HashMap<String, SensorReading>>>,
    gateways: Arc<HashSet<String>>,
}

impl Default for GatewayCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_SENSOR_COUNT,
            DEFAULT_GATEWAYS.iter().map(|g| g.to_string()),
        )
    }
}

impl GatewayCache {
    /// Seed `sensor_count` slots named `k1..kN`, accepting pushes from `gateways`.
    pub fn new(sensor_count: usize, gateways: impl IntoIterator<Item = String>) -> Self {
        let readings = (1..=sensor_count)
            .map(|n| (format!("k{n}"), SensorReading::new("", 0, 0)))
            .collect();

        Self {
            readings: Arc::new(RwLock::new(readings)),
            gateways: Arc::new(gateways.into_iter().collect()),
        }
    }

    pub fn accepts(&self, gateway: &str) -> bool {
        self.gateways.contains(gateway)
    }

    /// Copy of every slot's latest reading.
    pub async fn snapshot(&self) -> Snapshot {
        self.readings
            .read()
            .await
            .iter()
            .map(|(id, reading)| (id.clone(), reading.clone()))
            .collect()
    }

    /// Apply a gateway push and return how many slots were updated.
    ///
    /// `body` is a JSON object of sensor id to numeric value. Fractional
    /// values are truncated. Every updated slot is stamped with `now`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use leakwatch::relay::GatewayCache;
    ///
    /// # tokio_test::block_on(async {
    /// let relay = GatewayCache::default();
    /// let updated = relay.ingest("241", br#"{"k1": 1}"#, Utc::now()).await.unwrap();
    /// assert_eq!(updated, 1);
    /// # });
    /// ```
    pub async fn ingest(
        &self,
        gateway: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        if !self.accepts(gateway) {
            return Err(IngestError::UnknownGateway(gateway.to_string()));
        }

        let values = parse_values(body)?;
        let time = now.timestamp_millis();
        let mut readings = self.readings.write().await;
        let mut updated = 0;

        for (id, value) in values {
            if let Some(slot) = readings.get_mut(&id) {
                *slot = SensorReading::new(gateway, value, time);
                updated += 1;
            }
        }

        Ok(updated)
    }
}

fn parse_values(body: &[u8]) -> Result<HashMap<String, i64>, IngestError> {
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(body).map_err(|e| IngestError::InvalidPayload(e.to_string()))?;

    raw.into_iter()
        .map(|(id, value)| match value.as_number().and_then(truncate_number) {
            Some(number) => Ok((id, number)),
            None => Err(IngestError::InvalidPayload(format!(
                "value for '{id}' is not a number"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> GatewayCache {
        GatewayCache::new(3, ["241".to_string(), "242".to_string()])
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_seeded_slots() {
        let snapshot = cache().snapshot().await;

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("k3"), Some(&SensorReading::new("", 0, 0)));
        assert!(snapshot.get("k4").is_none());
    }

    #[tokio::test]
    async fn test_default_cache() {
        let cache = GatewayCache::default();
        assert_eq!(cache.snapshot().await.len(), 40);
        assert!(cache.accepts("245"));
        assert!(!cache.accepts("246"));
    }

    #[tokio::test]
    async fn test_ingest_updates_known_slots() {
        let cache = cache();

        let updated = cache
            .ingest("242", br#"{"k1": 1, "k2": 0.9, "k99": 1}"#, now())
            .await
            .unwrap();

        assert_eq!(updated, 2);
        let snapshot = cache.snapshot().await;
        assert_eq!(
            snapshot.get("k1"),
            Some(&SensorReading::new("242", 1, 1_700_000_000_000))
        );
        assert_eq!(snapshot.get("k2").unwrap().value, 0);
        assert_eq!(snapshot.get("k3").unwrap().time, 0);
        assert!(snapshot.get("k99").is_none());
    }

    #[tokio::test]
    async fn test_unknown_gateway_rejected() {
        let err = cache().ingest("999", br#"{"k1": 1}"#, now()).await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownGateway(ref g) if g == "999"));
    }

    #[tokio::test]
    async fn test_invalid_payloads_rejected() {
        let cache = cache();

        let bodies: [&[u8]; 3] = [b"not json", br#"[1, 2]"#, br#"{"k1": "wet"}"#];
        for body in bodies {
            let err = cache.ingest("241", body, now()).await.unwrap_err();
            assert!(matches!(err, IngestError::InvalidPayload(_)));
        }

        // Nothing was written
        assert_eq!(cache.snapshot().await.get("k1").unwrap().gateway, "");
    }
}
