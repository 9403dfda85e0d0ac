//! In-process fakes for the monitor's collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classification::types::Category;
use crate::classification::{Classifier, OriginProvider, ProviderVerdict};
use crate::controller::monitor::{Monitor, MonitorSettings};
use crate::enforcement::Enforcer;
use crate::error_handling::types::MonitorError;
use crate::ledger::{Ledger, MemoryLedger};
use crate::session_source::{Session, SessionSource};

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub const VPN_IP: &str = "198.51.100.7";
pub const HOME_IP: &str = "203.0.113.20";
pub const STALLED_IP: &str = "192.0.2.99";
pub const PANIC_IP: &str = "192.0.2.66";

/// Replays scripted fetch results; the last one repeats forever.
pub struct FakeSource {
    script: Mutex<VecDeque<Result<Vec<Session>, MonitorError>>>,
    stalled: bool,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(first: Result<Vec<Session>, MonitorError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([first])),
            stalled: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::new(Ok(Vec::new()))
        }
    }

    pub fn then(self, next: Result<Vec<Session>, MonitorError>) -> Self {
        self.script.lock().unwrap().push_back(next);
        self
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn fetch_active_sessions(&self) -> Result<Vec<Session>, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled {
            std::future::pending::<()>().await;
        }
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

/// Records terminate calls; optionally fails or takes time.
#[derive(Default)]
pub struct FakeEnforcer {
    pub terminated: Mutex<Vec<String>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeEnforcer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enforcer for FakeEnforcer {
    async fn terminate(&self, session_id: &str) -> Result<(), MonitorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.terminated.lock().unwrap().push(session_id.to_string());
        if self.fail {
            return Err(MonitorError::EnforcementFailed(format!(
                "session {} not found",
                session_id
            )));
        }
        Ok(())
    }
}

/// Answers from a fixed table; unknown addresses are residential.
/// `STALLED_IP` never answers and `PANIC_IP` panics.
#[derive(Default)]
pub struct TableProvider {
    pub table: HashMap<IpAddr, Vec<Category>>,
    pub lookups: AtomicUsize,
}

impl TableProvider {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(ip(VPN_IP), vec![Category::Vpn, Category::Datacenter]);
        Self {
            table,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OriginProvider for TableProvider {
    async fn lookup(&self, address: IpAddr) -> Result<ProviderVerdict, MonitorError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if address == ip(STALLED_IP) {
            std::future::pending::<()>().await;
        }
        if address == ip(PANIC_IP) {
            panic!("provider blew up on {}", address);
        }
        let categories = self
            .table
            .get(&address)
            .cloned()
            .unwrap_or_else(|| vec![Category::Residential]);
        Ok(ProviderVerdict {
            categories,
            confidence: 0.9,
        })
    }
}

pub fn settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_secs(30),
        max_backoff: Duration::from_secs(300),
        request_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(10),
        max_concurrency: 4,
        flagged_categories: vec![Category::Vpn, Category::Proxy],
        dry_run: false,
        ledger_retention: chrono::Duration::hours(168),
    }
}

/// Everything a test needs to inspect after driving a monitor.
pub struct Harness {
    pub monitor: Monitor,
    pub source: Arc<FakeSource>,
    pub enforcer: Arc<FakeEnforcer>,
    pub provider: Arc<TableProvider>,
    pub ledger: Arc<dyn Ledger>,
}

pub fn harness(source: FakeSource, enforcer: FakeEnforcer, settings: MonitorSettings) -> Harness {
    let source = Arc::new(source);
    let enforcer = Arc::new(enforcer);
    let provider = Arc::new(TableProvider::new());
    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let classifier = Arc::new(Classifier::new(
        provider.clone(),
        Duration::from_secs(86_400),
        settings.request_timeout,
    ));
    let monitor = Monitor::new(
        source.clone(),
        enforcer.clone(),
        classifier,
        ledger.clone(),
        settings,
    );
    Harness {
        monitor,
        source,
        enforcer,
        provider,
        ledger,
    }
}
