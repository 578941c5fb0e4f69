//! Runtime configuration, read from `LEAKWATCH_*` environment variables.
//!
//! Every setting has a default. A variable that is set but can not be
//! parsed is an error rather than being silently ignored.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::TimeDelta;

use crate::data_sources::gateway::DEFAULT_FETCH_TIMEOUT;
use crate::monitor::MonitorSettings;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::relay::{DEFAULT_GATEWAYS, DEFAULT_SENSOR_COUNT, MAX_SENSOR_COUNT};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3068;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    /// Base URL of the relay being polled; `/api/gw` is appended.
    pub source_url: String,

    pub poll_interval: Duration,

    pub fetch_timeout: Duration,

    pub monitor: MonitorSettings,

    /// Number of relay slots (`k1..kN`).
    pub sensor_count: usize,

    /// Gateway codes the relay accepts pushes from.
    pub gateways: Vec<String>,

    /// Optional floor layout file.
    pub layout_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "LEAKWATCH_PORT", DEFAULT_PORT)?;

        let source_url =
            lookup("LEAKWATCH_SOURCE_URL").unwrap_or_else(|| format!("http://127.0.0.1:{port}"));

        let poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "LEAKWATCH_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?);
        let fetch_timeout = Duration::from_millis(parse_or(
            &lookup,
            "LEAKWATCH_FETCH_TIMEOUT_MS",
            DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
        )?);
        if poll_interval.is_zero() || fetch_timeout.is_zero() {
            bail!("poll interval and fetch timeout must be greater than zero");
        }

        let defaults = MonitorSettings::default();
        let monitor = MonitorSettings {
            stale_after: millis_or(&lookup, "LEAKWATCH_STALE_AFTER_MS", defaults.stale_after)?,
            confirm_cooldown: millis_or(
                &lookup,
                "LEAKWATCH_CONFIRM_COOLDOWN_MS",
                defaults.confirm_cooldown,
            )?,
            cancel_cooldown: millis_or(
                &lookup,
                "LEAKWATCH_CANCEL_COOLDOWN_MS",
                defaults.cancel_cooldown,
            )?,
        };

        let sensor_count = parse_or(&lookup, "LEAKWATCH_SENSOR_COUNT", DEFAULT_SENSOR_COUNT)?;
        if sensor_count > MAX_SENSOR_COUNT {
            bail!("LEAKWATCH_SENSOR_COUNT must be at most {MAX_SENSOR_COUNT}, got {sensor_count}");
        }

        let gateways = match lookup("LEAKWATCH_GATEWAYS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
        };

        let layout_path = lookup("LEAKWATCH_LAYOUT").map(PathBuf::from);

        Ok(Self {
            port,
            source_url,
            poll_interval,
            fetch_timeout,
            monitor,
            sensor_count,
            gateways,
            layout_path,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: TimeDelta) -> anyhow::Result<TimeDelta>
where
    F: Fn(&str) -> Option<String>,
{
    let ms: i64 = parse_or(lookup, key, default.num_milliseconds())?;
    if ms <= 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(TimeDelta::milliseconds(ms))
}
