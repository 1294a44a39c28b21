//! HTTP handlers for API endpoints.

use crate::error::HazardError;
use crate::monitor::ActuatorCommand;
use crate::readings::{FeedFrame, NewReading};
use crate::web::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::{error, info, warn};

/// Endpoint index.
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "hazard-edge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "readings": "GET /readings",
            "ingest": "POST /readings",
            "feed_websocket": "GET /readings/latest",
            "feed_stream": "GET /readings/stream",
            "actuator": "GET /response_system/{engage|disengage}",
            "actuator_state": "GET /response_system",
            "health": "GET /api/health"
        }
    }))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store = match state.feed.store().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "Store ping failed");
            "unavailable"
        }
    };

    let actuator = match &state.actuator {
        Some(controller) => controller
            .current_state()
            .await
            .map(|s| s.as_str())
            .unwrap_or("unknown"),
        None => "unavailable",
    };

    Json(json!({
        "status": "ok",
        "service": "hazard-edge",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "store": store,
        "subscribers": state.active_subscribers(),
        "actuator": actuator
    }))
}

/// Most recent readings, newest first.
pub async fn list_readings(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeedFrame>>, StatusCode> {
    match state.feed.recent_frames().await {
        Ok(frames) => Ok(Json(frames)),
        Err(e) => {
            error!("Failed to query recent readings: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Accept a single reading keyed by `LPG`, `CH4`, `CO` and `Temperature`.
pub async fn ingest_reading(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable ingest body");
            return (
                rejection.status(),
                Json(json!({ "status": "error", "detail": rejection.body_text() })),
            );
        }
    };

    let reading = match NewReading::from_json(&payload) {
        Ok(reading) => reading,
        Err(e) => {
            warn!(error = %e, %payload, "Rejected ingest payload");
            let status = if e.is_rejected_input() {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::BAD_REQUEST
            };
            return (
                status,
                Json(json!({ "status": "error", "detail": e.to_string() })),
            );
        }
    };

    match state.feed.store().append(&reading).await {
        Ok(stored) => {
            info!(id = stored.id, "Reading ingested over HTTP");
            (
                StatusCode::CREATED,
                Json(json!({ "status": "success", "id": stored.id })),
            )
        }
        Err(e) => {
            error!(error = %e, "Failed to store ingested reading");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "detail": "store unavailable" })),
            )
        }
    }
}

/// Continuous feed as newline-delimited JSON, one frame per interval.
pub async fn feed_stream(State(state): State<AppState>) -> Response {
    let Some(permit) = state.try_subscribe() else {
        return subscribers_exhausted();
    };

    let frames = state.feed.subscribe_until(state.shutdown().clone());
    let lines = frames.map(move |frame| {
        let _slot = &permit;
        let mut line = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

pub(crate) fn subscribers_exhausted() -> Response {
    warn!("Feed subscriber limit reached");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "busy" })),
    )
        .into_response()
}

/// Drive the actuator by command name.
///
/// Always writes the command, even when the actuator is already in the
/// target state.
pub async fn actuator_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
) -> (StatusCode, Json<Value>) {
    let command: ActuatorCommand = match command.parse() {
        Ok(command) => command,
        Err(_) => {
            warn!(command = %command, "Invalid actuator command");
            return (StatusCode::BAD_REQUEST, Json(json!({ "status": "invalid" })));
        }
    };

    let Some(controller) = &state.actuator else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        );
    };

    let target = command.target_state();
    match controller.force_state(target).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": target.as_str() }))),
        Err(e) => {
            error!(error = %e, command = %command, "Actuator command failed");
            let status = match &e {
                HazardError::Command(_) | HazardError::DeviceIo(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "status": "error", "detail": e.to_string() })))
        }
    }
}

/// Last confirmed actuator state.
pub async fn actuator_status(State(state): State<AppState>) -> Json<Value> {
    let status = match &state.actuator {
        Some(controller) => controller
            .current_state()
            .await
            .map(|s| s.as_str())
            .unwrap_or("unknown"),
        None => "unavailable",
    };
    Json(json!({ "status": status }))
}
