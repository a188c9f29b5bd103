//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::audio::AudioError;
use crate::bridge::BridgeError;
use crate::config::ConfigError;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Top-level error type for the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio transcoding failed.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Agent bridge operation failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Request authentication failed.
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// I/O failure while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_maps_to_401() {
        let response = GatewayError::Unauthorized("bad key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_config_maps_to_500() {
        let error = GatewayError::Config(ConfigError::Invalid("bad".to_string()));
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
