pub mod health;
pub mod sessions;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use sessions::{create_session, get_session};
pub use websocket::session_websocket_handler;
