//! Plex media server integration: session listing, termination and the
//! webhook payload format.

pub mod client;
pub mod types;

pub use client::PlexClient;
pub use types::WebhookPayload;
