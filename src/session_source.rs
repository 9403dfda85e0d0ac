//! Session source.
//!
//! A [`SessionSource`] lists the playbacks currently active on the media
//! server. An empty list is a normal answer; only an unreachable server, a
//! malformed answer or rejected credentials are errors.

use async_trait::async_trait;

use crate::error_handling::types::MonitorError;

pub mod session;

pub use session::Session;

#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fails with [`MonitorError::UpstreamUnavailable`] or [`MonitorError::AuthError`].
    async fn fetch_active_sessions(&self) -> Result<Vec<Session>, MonitorError>;
}
