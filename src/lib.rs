pub mod audio;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod pacer;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use errors::{GatewayError, GatewayResult};
pub use state::AppState;
