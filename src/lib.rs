//! Leakwatch - live water-leak sensor monitoring.
//!
//! # Overview
//!
//! Leakwatch polls the latest readings of a fixed set of water-leak sensors,
//! classifies each one as normal, alarm or stale, and decides when the
//! operator should be alerted. Alerts are deduplicated by the set of
//! alarming sensors: dismissing an alert snoozes that exact set for a
//! cooldown, while any different set alerts immediately.
//!
//! Everything is in memory and best effort. Missing or stale data never
//! raises an alarm.
//!
//! # Modules
//!
//! - [`model`]: Readings, snapshots, classifications and API views
//! - [`classifier`]: Staleness and alarm classification
//! - [`alerting`]: Alert deduplication and snoozing
//! - [`poller`]: Fixed-cadence snapshot polling
//! - [`monitor`]: Session state shared with the HTTP layer
//! - [`data_sources`]: Snapshot sources (gateway relay client)
//! - [`relay`]: In-memory gateway relay
//! - [`layout`]: Floor-plan sensor placement
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod alerting;
pub mod api;
pub mod classifier;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod layout;
pub mod model;
pub mod monitor;
pub mod poller;
pub mod relay;
