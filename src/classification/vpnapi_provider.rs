//! vpnapi.io backed origin provider.
//!
//! `GET {base_url}/{ip}?key={api_key}` answers with a `security` object of
//! boolean flags. The key is never written to the logs: reqwest errors are
//! stripped of their URL before being reported.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use super::origin_provider::{OriginProvider, ProviderVerdict};
use super::types::Category;
use crate::error_handling::types::MonitorError;

/// Confidence attached to an answer without any flag set. The provider only
/// asserts what it detected, a clean answer is weaker evidence.
const CLEAN_CONFIDENCE: f32 = 0.75;

#[derive(Debug, Deserialize)]
struct VpnApiResponse {
    #[serde(default)]
    security: Option<SecurityFlags>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityFlags {
    #[serde(default)]
    vpn: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    tor: bool,
    #[serde(default)]
    relay: bool,
}

pub struct VpnApiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VpnApiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::ClassificationUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn lookup_url(&self, address: IpAddr) -> Result<Url, MonitorError> {
        Url::parse_with_params(
            &format!("{}/{}", self.base_url, address),
            &[("key", self.api_key.as_str())],
        )
        .map_err(|e| MonitorError::ClassificationUnavailable(format!("invalid provider url: {}", e)))
    }
}

/// Turns a decoded provider body into a verdict.
fn verdict_from_body(body: &str) -> Result<ProviderVerdict, MonitorError> {
    let response: VpnApiResponse = serde_json::from_str(body).map_err(|e| {
        MonitorError::ClassificationUnavailable(format!("malformed provider response: {}", e))
    })?;

    let flags = match response.security {
        Some(flags) => flags,
        None => {
            return Err(MonitorError::ClassificationUnavailable(
                response
                    .message
                    .unwrap_or_else(|| "provider response has no security section".to_string()),
            ))
        }
    };

    let mut categories = Vec::new();
    if flags.vpn {
        categories.push(Category::Vpn);
    }
    if flags.proxy || flags.tor || flags.relay {
        categories.push(Category::Proxy);
    }

    if categories.is_empty() {
        Ok(ProviderVerdict {
            categories: vec![Category::Residential],
            confidence: CLEAN_CONFIDENCE,
        })
    } else {
        Ok(ProviderVerdict {
            categories,
            confidence: 1.0,
        })
    }
}

#[async_trait]
impl OriginProvider for VpnApiProvider {
    async fn lookup(&self, address: IpAddr) -> Result<ProviderVerdict, MonitorError> {
        let url = self.lookup_url(address)?;
        debug!("Looking up origin of {}", address);

        let response = self.client.get(url).send().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                MonitorError::ClassificationUnavailable(format!("provider timed out: {}", e))
            } else {
                MonitorError::ClassificationUnavailable(format!("provider unreachable: {}", e))
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Origin provider rate limit reached");
                return Err(MonitorError::ClassificationUnavailable(
                    "provider rate limit reached".to_string(),
                ));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Origin provider rejected the API key ({})", status);
                return Err(MonitorError::ClassificationUnavailable(format!(
                    "provider rejected the API key: {}",
                    status
                )));
            }
            other => {
                return Err(MonitorError::ClassificationUnavailable(format!(
                    "provider answered {}",
                    other
                )))
            }
        }

        let body = response.text().await.map_err(|e| {
            MonitorError::ClassificationUnavailable(format!(
                "failed to read provider response: {}",
                e.without_url()
            ))
        })?;
        verdict_from_body(&body)
    }
}
