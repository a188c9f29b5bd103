//! Shared application state.

use std::sync::Arc;

use crate::bridge::BridgeConnector;
use crate::config::ServerConfig;

/// State shared across all connections.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Factory for per-session agent bridges.
    pub connector: Arc<dyn BridgeConnector>,
}

impl AppState {
    /// Create application state around a bridge connector.
    pub fn new(config: ServerConfig, connector: Arc<dyn BridgeConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }
}
