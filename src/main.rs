//! Leakwatch - live water-leak sensor monitoring.
//!
//! Runs the gateway relay, the snapshot poller and the monitor API in one
//! process. By default the poller reads this same process's relay.
//!
//! # API Endpoints
//!
//! - `POST /api/gw/{code}` - Push gateway readings
//! - `GET /api/gw` - Latest readings
//! - `GET /api/markers` - Marker classification per floor
//! - `GET /api/alert` - Current alert
//! - `POST /api/alert/{confirm|cancel}` - Dismiss the current alert
//! - `GET /api/status` - Poll loop health
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use leakwatch::api::{AppState, router};
use leakwatch::config::Config;
use leakwatch::data_sources::GatewayClient;
use leakwatch::layout::Layout;
use leakwatch::monitor::Monitor;
use leakwatch::poller::Poller;
use leakwatch::relay::GatewayCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("leakwatch=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        source = %config.source_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Starting Leakwatch"
    );
    if config.fetch_timeout >= config.poll_interval {
        warn!(
            fetch_timeout_ms = config.fetch_timeout.as_millis() as u64,
            "Fetch timeout is not below the poll interval"
        );
    }

    let layout = match &config.layout_path {
        Some(path) => Layout::load(path).await?,
        None => Layout::default(),
    };
    info!(
        floors = layout.floors().len(),
        sensors = layout.sensor_count(),
        "Layout loaded"
    );

    let relay = GatewayCache::new(config.sensor_count, config.gateways.clone());
    let client = GatewayClient::with_timeout(&config.source_url, config.fetch_timeout)?;
    let mut poller =
        Poller::new(client, config.poll_interval).with_fetch_timeout(config.fetch_timeout);

    let monitor = Monitor::new(config.monitor);
    let shutdown = CancellationToken::new();
    let consumer = monitor.spawn(poller.subscribe(), shutdown.clone());

    let state = AppState {
        relay,
        monitor,
        layout: Arc::new(layout),
        poll_status: poller.status(),
    };
    let app = router(state);

    // Bind before polling so a self-hosted relay answers the first fetch
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Leakwatch is listening");

    poller.start();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    poller.stop().await;
    shutdown.cancel();
    consumer.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
