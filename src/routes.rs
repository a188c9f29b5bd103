//! HTTP route configuration.
//!
//! # Endpoints
//!
//! `GET /health` - liveness probe, never authenticated
//! `GET /voicebot` - WebSocket upgrade for the AudioConnector protocol
//!
//! Authentication middleware is applied in `main.rs` once state exists,
//! and only to the voicebot router, so the upgrade request is checked
//! before the socket opens while the health probe stays open.

use axum::{Json, Router, routing::get};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::session::voicebot_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the router for the AudioConnector WebSocket endpoint.
///
/// Note: authentication middleware should be applied by the caller after
/// state is available.
pub fn create_voicebot_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voicebot", get(voicebot_handler))
        .layer(TraceLayer::new_for_http())
}

/// Create the public router (no auth).
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_handler))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
