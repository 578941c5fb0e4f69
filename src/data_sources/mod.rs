//! Sources of sensor snapshots.
//!
//! The poller talks to a [`SnapshotSource`]. In production that is the
//! [`GatewayClient`], which reads the relay's `GET /api/gw` endpoint.
//!
//! # Data Sources
//!
//! - [`gateway`]: HTTP client for the gateway relay

use std::future::Future;

use crate::error::FetchError;
use crate::model::Snapshot;

pub mod gateway;

pub use gateway::GatewayClient;

/// Anything that can produce a complete sensor snapshot on demand.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Fetch the latest snapshot.
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}
