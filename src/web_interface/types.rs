use serde::Serialize;

use crate::controller::MonitorStatus;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// GET /health body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the media server keeps failing
    pub status: &'static str,
    #[serde(flatten)]
    pub monitor: MonitorStatus,
    pub cache_entries: usize,
    pub dry_run: bool,
}

/// POST /webhook body
#[derive(Debug, PartialEq, Serialize)]
pub struct WebhookReply {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookReply {
    pub fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            error: None,
        }
    }

    pub fn error(status: &str, error: String) -> Self {
        Self {
            status: status.to_string(),
            error: Some(error),
        }
    }
}
