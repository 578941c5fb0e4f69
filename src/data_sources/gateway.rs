//! Gateway relay client.
//!
//! The relay keeps the latest reading for every sensor slot and serves the
//! whole map at `GET /api/gw`:
//!
//! ```json
//! {
//!     "k1": { "gateway": "241", "value": 0, "time": 1718000000000 },
//!     "k2": { "gateway": "243", "value": 1, "time": 1718000004000 }
//! }
//! ```
//!
//! Any non-2xx answer or a body that does not have this shape is a failed
//! fetch.

use std::time::Duration;

use crate::data_sources::SnapshotSource;
use crate::error::FetchError;
use crate::model::Snapshot;

/// Path of the snapshot endpoint, relative to the relay base URL.
pub const SNAPSHOT_PATH: &str = "/api/gw";

/// Default bound on a single fetch. Kept below the poll interval so a
/// stalled request never overlaps the next scheduled poll.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// Client for the relay's snapshot endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    url: String,
}

impl GatewayClient {
    /// Create a client for the relay at `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), SNAPSHOT_PATH),
        })
    }

    /// Full URL being polled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the current snapshot.
    pub async fn get_snapshot(&self) -> Result<Snapshot, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Protocol(status));
        }

        let body = response.bytes().await?;
        let snapshot = serde_json::from_slice::<Snapshot>(&body)?;
        Ok(snapshot)
    }
}

impl SnapshotSource for GatewayClient {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        self.get_snapshot().await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
