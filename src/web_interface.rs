//! HTTP surface: health, ledger listing and the Plex webhook receiver.
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::*;
pub use types::{ApiError, HealthResponse, WebhookReply};
pub use web_server::*;
