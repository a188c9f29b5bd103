//! Shared-secret authentication middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::errors::GatewayError;
use crate::state::AppState;

/// Header carrying the shared API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Extract the API key from the request.
///
/// Supports two sources for WebSocket compatibility:
/// 1. `X-API-Key` header (preferred)
/// 2. `?api_key=<key>` query parameter (for clients that cannot set
///    headers on the upgrade request)
fn extract_api_key(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(API_KEY_HEADER)
        && let Ok(key) = value.to_str()
    {
        debug!("API key extracted from header");
        return Some(key.to_string());
    }

    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("api_key=") {
                debug!("API key extracted from query parameter");
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Validate the shared API key when one is configured.
///
/// Auth is disabled entirely when no key is configured; the request
/// passes through untouched.
pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    match extract_api_key(&request) {
        Some(provided) if provided == expected => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "rejected request with wrong API key");
            Err(GatewayError::Unauthorized("invalid API key".to_string()))
        }
        None => {
            warn!(path = %request.uri().path(), "rejected request without API key");
            Err(GatewayError::Unauthorized("missing API key".to_string()))
        }
    }
}
