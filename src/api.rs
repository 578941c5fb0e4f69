//! HTTP API handlers for Leakwatch.
//!
//! # Endpoints
//!
//! Relay (gateways and the poller):
//! - `POST /api/gw/{code}` - Push readings from gateway `code`
//! - `GET /api/gw` - Latest reading for every sensor slot
//!
//! Monitor (operator UI):
//! - `GET /api/markers` - Per-floor marker classification and alert flags
//! - `GET /api/alert` - Currently presented alert and last dismissal
//! - `POST /api/alert/confirm` - Acknowledge with the long cooldown
//! - `POST /api/alert/cancel` - Close with the short cooldown
//! - `GET /api/status` - Poll loop health
//! - `GET /health` - Health check

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::layout::Layout;
use crate::model::{AlertView, Dismissal, MarkersResponse, Snapshot};
use crate::monitor::Monitor;
use crate::poller::PollStatus;
use crate::relay::GatewayCache;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: GatewayCache,
    pub monitor: Monitor,
    pub layout: Arc<Layout>,
    pub poll_status: watch::Receiver<PollStatus>,
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/gw", get(get_readings))
        .route("/api/gw/:code", post(post_readings))
        .route("/api/markers", get(get_markers))
        .route("/api/alert", get(get_alert))
        .route("/api/alert/:action", post(post_dismissal))
        .route("/api/status", get(get_status))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// GET /api/gw - Latest reading for every sensor slot.
///
/// # Response
///
/// ```json
/// {
///     "k1": { "gateway": "241", "value": 0, "time": 1718000000000 },
///     "k2": { "gateway": "", "value": 0, "time": 0 }
/// }
/// ```
pub async fn get_readings(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.relay.snapshot().await)
}

/// POST /api/gw/{code} - Record readings pushed by a gateway.
///
/// # Request Body
///
/// ```json
/// { "k1": 1, "k7": 0 }
/// ```
///
/// Ids without a relay slot are ignored.
///
/// # Response
///
/// - `200 OK` on success
/// - `404 Not Found` for an unknown gateway code
/// - `400 Bad Request` for a malformed body
#[instrument(skip(state, body))]
pub async fn post_readings(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    match state.relay.ingest(&code, &body, Utc::now()).await {
        Ok(updated) => {
            info!(gateway = %code, updated, "Gateway readings recorded");
            (StatusCode::OK, String::new())
        }
        Err(e) => {
            warn!(gateway = %code, error = %e, "Rejected gateway push");
            (e.status(), e.to_string())
        }
    }
}

/// GET /api/markers - Marker facts for the renderer.
///
/// # Response
///
/// ```json
/// {
///     "timestamp": "2024-06-10T08:00:00Z",
///     "floors": [
///         {
///             "name": "B2",
///             "asset": "/f2.png",
///             "markers": [
///                 {
///                     "id": "k1",
///                     "label": "1",
///                     "position": [120.5, 1.0, -40.0],
///                     "classification": "alarm",
///                     "alerting": true
///                 }
///             ]
///         }
///     ]
/// }
/// ```
///
/// `classification` is one of "normal", "alarm", "stale", or null when no
/// reading is known for the sensor.
#[instrument(skip(state))]
pub async fn get_markers(State(state): State<AppState>) -> Json<MarkersResponse> {
    let now = Utc::now();
    let floors = state.monitor.markers(&state.layout, now).await;

    Json(MarkersResponse {
        timestamp: now,
        floors,
    })
}

/// GET /api/alert - The alert currently presented to the operator.
///
/// # Response
///
/// ```json
/// {
///     "active": true,
///     "sensors": ["k12", "k3"],
///     "labels": ["12", "3"],
///     "last_dismissed": {
///         "signature": "k3",
///         "shown_at": "2024-06-10T08:00:00Z",
///         "cooldown_ms": 600000
///     }
/// }
/// ```
pub async fn get_alert(State(state): State<AppState>) -> Json<AlertView> {
    Json(state.monitor.alert_view(Utc::now()).await)
}

/// POST /api/alert/{confirm|cancel} - Dismiss the presented alert.
///
/// `confirm` snoozes the same alarm set for the long cooldown, `cancel` for
/// the short one. A different alarm set always raises a new alert.
#[instrument(skip(state))]
pub async fn post_dismissal(
    State(state): State<AppState>,
    Path(action): Path<Dismissal>,
) -> Json<AlertView> {
    Json(state.monitor.dismiss(action, Utc::now()).await)
}

/// GET /api/status - Poll loop health.
pub async fn get_status(State(state): State<AppState>) -> Json<PollStatus> {
    Json(state.poll_status.borrow().clone())
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
