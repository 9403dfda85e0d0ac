//! Enforcement actuator.
//!
//! Terminating a session is externally visible and cannot be undone: the
//! remote user's playback stops. Callers must consult the ledger first, the
//! actuator itself keeps no memory of what it already terminated.

use async_trait::async_trait;

use crate::error_handling::types::MonitorError;

#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Fails with [`MonitorError::EnforcementFailed`] when the media server
    /// refuses the termination (e.g. the session already ended).
    async fn terminate(&self, session_id: &str) -> Result<(), MonitorError>;
}
