use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use super::types::SessionsEnvelope;
use crate::enforcement::Enforcer;
use crate::error_handling::types::MonitorError;
use crate::session_source::{Session, SessionSource};

const TOKEN_HEADER: &str = "X-Plex-Token";

/// HTTP client for the Plex control plane.
///
/// Implements both [`SessionSource`] (list active sessions) and [`Enforcer`]
/// (terminate a session). The token travels in the `X-Plex-Token` header so it
/// never shows up in a logged URL.
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
    termination_reason: String,
}

impl PlexClient {
    pub fn new(
        base_url: &str,
        token: &str,
        termination_reason: &str,
        timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            termination_reason: termination_reason.to_string(),
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/status/sessions", self.base_url)
    }

    fn terminate_url(&self, session_id: &str) -> Result<Url, MonitorError> {
        Url::parse_with_params(
            &format!("{}/status/sessions/terminate", self.base_url),
            &[
                ("sessionId", session_id),
                ("reason", self.termination_reason.as_str()),
            ],
        )
        .map_err(|e| MonitorError::EnforcementFailed(format!("invalid terminate url: {}", e)))
    }
}

/// Maps the status of a session listing to the error taxonomy.
fn check_fetch_status(status: StatusCode) -> Result<(), MonitorError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MonitorError::AuthError(format!(
            "media server answered {}",
            status
        ))),
        other => Err(MonitorError::UpstreamUnavailable(format!(
            "media server answered {}",
            other
        ))),
    }
}

/// Maps the status of a termination request to the error taxonomy.
fn check_terminate_status(status: StatusCode) -> Result<(), MonitorError> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MonitorError::AuthError(format!(
            "termination refused with {}",
            status
        ))),
        other => Err(MonitorError::EnforcementFailed(format!(
            "media server answered {}",
            other
        ))),
    }
}

pub(crate) fn parse_sessions(body: &str) -> Result<Vec<Session>, MonitorError> {
    let envelope: SessionsEnvelope = serde_json::from_str(body).map_err(|e| {
        MonitorError::UpstreamUnavailable(format!("malformed session listing: {}", e))
    })?;
    Ok(envelope.into_sessions())
}

#[async_trait]
impl SessionSource for PlexClient {
    async fn fetch_active_sessions(&self) -> Result<Vec<Session>, MonitorError> {
        let response = self
            .client
            .get(self.sessions_url())
            .header(TOKEN_HEADER, &self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| MonitorError::UpstreamUnavailable(e.to_string()))?;

        check_fetch_status(response.status())?;

        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::UpstreamUnavailable(e.to_string()))?;
        let sessions = parse_sessions(&body)?;
        debug!("Media server reports {} active session(s)", sessions.len());
        Ok(sessions)
    }
}

#[async_trait]
impl Enforcer for PlexClient {
    async fn terminate(&self, session_id: &str) -> Result<(), MonitorError> {
        let url = self.terminate_url(session_id)?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| MonitorError::EnforcementFailed(e.to_string()))?;

        check_terminate_status(response.status())?;
        info!("Media server terminated session {}", session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PlexClient {
        PlexClient::new(
            "http://127.0.0.1:32400/",
            "token",
            "Streaming from a VPN",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn fetch_status_mapping() {
        assert!(check_fetch_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_fetch_status(StatusCode::UNAUTHORIZED),
            Err(MonitorError::AuthError(_))
        ));
        assert!(matches!(
            check_fetch_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(MonitorError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn terminate_status_mapping() {
        assert!(check_terminate_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_terminate_status(StatusCode::NOT_FOUND),
            Err(MonitorError::EnforcementFailed(_))
        ));
        assert!(matches!(
            check_terminate_status(StatusCode::FORBIDDEN),
            Err(MonitorError::AuthError(_))
        ));
    }

    #[test]
    fn malformed_listing_is_upstream_unavailable() {
        assert!(matches!(
            parse_sessions("<MediaContainer size=\"0\"/>"),
            Err(MonitorError::UpstreamUnavailable(_))
        ));
        assert!(parse_sessions(r#"{"MediaContainer":{"size":0}}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let plex = client();
        assert_eq!(plex.sessions_url(), "http://127.0.0.1:32400/status/sessions");

        let url = plex.terminate_url("abc 1").unwrap();
        assert_eq!(url.path(), "/status/sessions/terminate");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("sessionId".to_string(), "abc 1".to_string()),
                ("reason".to_string(), "Streaming from a VPN".to_string()),
            ]
        );
        assert!(!url.as_str().contains("token"));
    }
}
