use async_trait::async_trait;
use std::net::IpAddr;

use super::types::Category;
use crate::error_handling::types::MonitorError;

/// Raw answer of an external reputation provider for one address.
///
/// A provider may report several categories at once (e.g. an address that is
/// both a VPN exit and a datacenter host); the classifier collapses them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderVerdict {
    pub categories: Vec<Category>,
    pub confidence: f32,
}

/// External lookup backing the [`Classifier`](super::Classifier).
///
/// Implementations must map every failure (unreachable, rate-limited,
/// malformed answer) to [`MonitorError::ClassificationUnavailable`].
#[async_trait]
pub trait OriginProvider: Send + Sync {
    async fn lookup(&self, address: IpAddr) -> Result<ProviderVerdict, MonitorError>;
}
