pub mod auth;

// Re-export middleware functions
pub use auth::api_key_middleware;
