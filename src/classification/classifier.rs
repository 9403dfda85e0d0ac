use log::{debug, info};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use super::origin_provider::OriginProvider;
use super::types::{Category, Classification};
use crate::configuration::types::IpRange;
use crate::error_handling::types::MonitorError;

struct CachedClassification {
    classification: Classification,
    /// `None` when the TTL reaches past what the clock can represent
    expires_at: Option<Instant>,
}

impl CachedClassification {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Labels network addresses, caching provider answers for a bounded time.
///
/// Lookup order:
/// 1. the configured test address is always `vpn`
/// 2. trusted ranges are `residential` without a lookup
/// 3. a cached answer younger than the TTL
/// 4. the external provider, bounded by `lookup_timeout`
///
/// Only successful lookups are cached. A failed lookup is retried the next
/// time the address is classified.
pub struct Classifier {
    provider: Arc<dyn OriginProvider>,
    cache: RwLock<HashMap<IpAddr, CachedClassification>>,
    ttl: Duration,
    lookup_timeout: Duration,
    test_blocked_ip: Option<IpAddr>,
    trusted_ranges: Vec<IpRange>,
}

impl Classifier {
    pub fn new(provider: Arc<dyn OriginProvider>, ttl: Duration, lookup_timeout: Duration) -> Self {
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
            ttl,
            lookup_timeout,
            test_blocked_ip: None,
            trusted_ranges: Vec::new(),
        }
    }

    pub fn with_test_blocked_ip(mut self, address: Option<IpAddr>) -> Self {
        self.test_blocked_ip = address;
        self
    }

    pub fn with_trusted_ranges(mut self, ranges: Vec<IpRange>) -> Self {
        self.trusted_ranges = ranges;
        self
    }

    pub async fn classify(&self, address: IpAddr) -> Result<Classification, MonitorError> {
        if self.test_blocked_ip == Some(address) {
            info!("{} is the configured test address, classifying as vpn", address);
            return Ok(Classification::new(address, Category::Vpn, 1.0));
        }

        if self.trusted_ranges.iter().any(|r| r.contains(&address)) {
            debug!("{} is inside a trusted range", address);
            return Ok(Classification::new(address, Category::Residential, 1.0));
        }

        if let Some(hit) = self.cached(&address) {
            debug!("Cache hit for {}: {}", address, hit.category);
            return Ok(hit);
        }

        let verdict = match tokio::time::timeout(self.lookup_timeout, self.provider.lookup(address))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(MonitorError::ClassificationUnavailable(format!(
                    "lookup of {} timed out after {:?}",
                    address, self.lookup_timeout
                )))
            }
        };

        let classification = Classification::new(
            address,
            Category::most_restrictive(verdict.categories),
            verdict.confidence,
        );
        debug!(
            "Classified {} as {} (confidence {:.2})",
            address, classification.category, classification.confidence
        );

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                address,
                CachedClassification {
                    classification: classification.clone(),
                    expires_at: Instant::now().checked_add(self.ttl),
                },
            );
        }
        Ok(classification)
    }

    fn cached(&self, address: &IpAddr) -> Option<Classification> {
        let cache = self.cache.read().ok()?;
        cache
            .get(address)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.classification.clone())
    }

    /// Drops expired cache entries, returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.cache.write() {
            Ok(mut cache) => {
                let before = cache.len();
                cache.retain(|_, entry| entry.is_fresh(now));
                before - cache.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::origin_provider::ProviderVerdict;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider answering from a script, one answer per call.
    struct ScriptedProvider {
        answers: Mutex<Vec<Result<ProviderVerdict, MonitorError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<Result<ProviderVerdict, MonitorError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into_iter().rev().collect()),
                calls: AtomicUsize::new(0),
                delay: None,
            })
        }

        fn stalled() -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay: Some(Duration::from_secs(3600)),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OriginProvider for ScriptedProvider {
        async fn lookup(&self, _address: IpAddr) -> Result<ProviderVerdict, MonitorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(MonitorError::ClassificationUnavailable("script exhausted".into())))
        }
    }

    fn verdict(categories: Vec<Category>) -> Result<ProviderVerdict, MonitorError> {
        Ok(ProviderVerdict {
            categories,
            confidence: 1.0,
        })
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_lookups_within_ttl_hit_the_cache() {
        let provider = ScriptedProvider::new(vec![verdict(vec![Category::Vpn])]);
        let classifier = Classifier::new(
            provider.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let first = classifier.classify(addr("203.0.113.5")).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        let second = classifier.classify(addr("203.0.113.5")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(classifier.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_looked_up_again() {
        let provider = ScriptedProvider::new(vec![
            verdict(vec![Category::Residential]),
            verdict(vec![Category::Datacenter]),
        ]);
        let classifier = Classifier::new(
            provider.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let first = classifier.classify(addr("198.51.100.9")).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let second = classifier.classify(addr("198.51.100.9")).await.unwrap();

        assert_eq!(first.category, Category::Residential);
        assert_eq!(second.category, Category::Datacenter);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let provider = ScriptedProvider::new(vec![
            Err(MonitorError::ClassificationUnavailable("429".into())),
            verdict(vec![Category::Residential]),
        ]);
        let classifier = Classifier::new(
            provider.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        assert!(classifier.classify(addr("198.51.100.7")).await.is_err());
        assert!(classifier.is_empty());
        let retry = classifier.classify(addr("198.51.100.7")).await.unwrap();
        assert_eq!(retry.category, Category::Residential);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out() {
        let provider = ScriptedProvider::stalled();
        let classifier = Classifier::new(
            provider.clone(),
            Duration::from_secs(60),
            Duration::from_secs(2),
        );

        match classifier.classify(addr("203.0.113.77")).await {
            Err(MonitorError::ClassificationUnavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(classifier.is_empty());
    }

    #[tokio::test]
    async fn multiple_categories_collapse_to_most_restrictive() {
        let provider = ScriptedProvider::new(vec![verdict(vec![
            Category::Datacenter,
            Category::Vpn,
            Category::Proxy,
        ])]);
        let classifier = Classifier::new(provider, Duration::from_secs(60), Duration::from_secs(5));

        let c = classifier.classify(addr("203.0.113.9")).await.unwrap();
        assert_eq!(c.category, Category::Vpn);
    }

    #[tokio::test]
    async fn test_address_and_trusted_ranges_skip_the_provider() {
        let provider = ScriptedProvider::new(Vec::new());
        let classifier = Classifier::new(
            provider.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .with_test_blocked_ip(Some(addr("192.0.2.1")))
        .with_trusted_ranges(vec![IpRange {
            start: addr("10.0.0.0"),
            end: addr("10.255.255.255"),
        }]);

        let test = classifier.classify(addr("192.0.2.1")).await.unwrap();
        assert_eq!(test.category, Category::Vpn);
        let lan = classifier.classify(addr("10.1.2.3")).await.unwrap();
        assert_eq!(lan.category, Category::Residential);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let provider = ScriptedProvider::new(vec![
            verdict(vec![Category::Residential]),
            verdict(vec![Category::Residential]),
        ]);
        let classifier = Classifier::new(provider, Duration::from_secs(60), Duration::from_secs(5));

        classifier.classify(addr("198.51.100.1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        classifier.classify(addr("198.51.100.2")).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(classifier.purge_expired(), 1);
        assert_eq!(classifier.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_ttl_never_expires() {
        let provider = ScriptedProvider::new(vec![verdict(vec![Category::Vpn])]);
        let classifier = Classifier::new(provider.clone(), Duration::MAX, Duration::from_secs(5));

        let first = classifier.classify(addr("203.0.113.77")).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 365 * 24 * 3600)).await;
        let second = classifier.classify(addr("203.0.113.77")).await.unwrap();

        assert_eq!(first.category, Category::Vpn);
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(classifier.purge_expired(), 0);
    }
}
