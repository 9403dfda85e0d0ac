//! Origin classification.
//!
//! Decides whether a client address belongs to a residential line, a
//! datacenter, a VPN exit or a proxy. The [`Classifier`] owns the TTL cache
//! and the fail-open bookkeeping; the actual reputation data comes from an
//! [`OriginProvider`] (vpnapi.io in production, fakes in tests).

pub mod classifier;
pub mod origin_provider;
pub mod types;
pub mod vpnapi_provider;

pub use classifier::Classifier;
pub use origin_provider::{OriginProvider, ProviderVerdict};
pub use types::{Category, Classification};
pub use vpnapi_provider::VpnApiProvider;
