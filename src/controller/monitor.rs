use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::classification::types::{Category, Classification};
use crate::classification::Classifier;
use crate::configuration::Config;
use crate::controller::backoff::Backoff;
use crate::controller::claims::SessionClaims;
use crate::controller::status::{CycleReport, LoopState, MonitorStatus, SessionOutcome, StatusHandle};
use crate::enforcement::Enforcer;
use crate::error_handling::types::MonitorError;
use crate::ledger::{Decision, Ledger, LedgerEntry};
use crate::session_source::{Session, SessionSource};

/// Tunables of the poll loop, taken from the configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_concurrency: usize,
    pub flagged_categories: Vec<Category>,
    pub dry_run: bool,
    pub ledger_retention: chrono::Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_backoff: config.max_backoff(),
            request_timeout: config.request_timeout(),
            shutdown_grace: config.shutdown_grace(),
            max_concurrency: config.max_concurrency.max(1),
            flagged_categories: config.flagged_categories.clone(),
            dry_run: config.dry_run,
            ledger_retention: config.ledger_retention(),
        }
    }
}

/// Poll loop context.
///
/// Every collaborator is held behind an `Arc`, so clones share the cache,
/// ledger, claims and status. Per-session tasks and webhook handlers each
/// work on their own clone.
#[derive(Clone)]
pub struct Monitor {
    source: Arc<dyn SessionSource>,
    enforcer: Arc<dyn Enforcer>,
    classifier: Arc<Classifier>,
    ledger: Arc<dyn Ledger>,
    settings: Arc<MonitorSettings>,
    claims: SessionClaims,
    status: StatusHandle,
    first_seen: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn SessionSource>,
        enforcer: Arc<dyn Enforcer>,
        classifier: Arc<Classifier>,
        ledger: Arc<dyn Ledger>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            enforcer,
            classifier,
            ledger,
            settings: Arc::new(settings),
            claims: SessionClaims::new(),
            status: StatusHandle::new(),
            first_seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn status(&self) -> Option<MonitorStatus> {
        self.status.snapshot()
    }

    pub fn ledger(&self) -> Arc<dyn Ledger> {
        Arc::clone(&self.ledger)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn cache_entries(&self) -> usize {
        self.classifier.len()
    }

    pub fn is_flagged(&self, category: Category) -> bool {
        self.settings.flagged_categories.contains(&category)
    }

    pub async fn classify(&self, address: IpAddr) -> Result<Classification, MonitorError> {
        self.classifier.classify(address).await
    }

    /// Runs the loop until `shutdown` flips or the media server rejects the
    /// credentials. An interrupted cycle gets `shutdown_grace` to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MonitorError> {
        let mut backoff = Backoff::new(self.settings.poll_interval, self.settings.max_backoff);
        info!(
            "Monitoring sessions every {:?}{}",
            self.settings.poll_interval,
            if self.settings.dry_run { " (dry run)" } else { "" }
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle = self.run_cycle();
            tokio::pin!(cycle);
            let outcome = tokio::select! {
                outcome = &mut cycle => outcome,
                _ = shutdown.changed() => {
                    info!("Shutdown requested, waiting up to {:?} for the current cycle", self.settings.shutdown_grace);
                    match tokio::time::timeout(self.settings.shutdown_grace, &mut cycle).await {
                        Ok(Ok(report)) => self.status.record_cycle(report),
                        Ok(Err(e)) => warn!("Last cycle failed during shutdown: {}", e),
                        Err(_) => warn!("Abandoned the in-flight cycle after {:?}", self.settings.shutdown_grace),
                    }
                    break;
                }
            };

            let delay = match outcome {
                Ok(report) => {
                    backoff.reset();
                    info!(
                        "Cycle done: {} fetched, {} skipped, {} allowed, {} blocked, {} would block, {} unknown, {} failed",
                        report.fetched,
                        report.skipped,
                        report.allowed,
                        report.blocked,
                        report.would_block,
                        report.unknown,
                        report.failed
                    );
                    self.status.record_cycle(report);
                    self.settings.poll_interval
                }
                Err(MonitorError::AuthError(e)) => {
                    error!("Media server rejected the token: {}", e);
                    self.status.record_failure(e.clone());
                    self.status.set_state(LoopState::Terminating);
                    return Err(MonitorError::AuthError(e));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("{}; retrying in {:?}", e, delay);
                    self.status.record_failure(e.to_string());
                    delay
                }
            };

            self.status.set_state(LoopState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.status.set_state(LoopState::Terminating);
        info!("Monitor stopped");
        Ok(())
    }

    /// Fetches the active sessions once and evaluates every distinct one.
    ///
    /// A failed fetch is returned to the caller; failures of individual
    /// sessions only show up in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        self.status.set_state(LoopState::Fetching);
        let sessions = match tokio::time::timeout(
            self.settings.request_timeout,
            self.source.fetch_active_sessions(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(MonitorError::UpstreamUnavailable(format!(
                    "session fetch timed out after {:?}",
                    self.settings.request_timeout
                )))
            }
        };

        self.status.set_state(LoopState::Evaluating);
        let mut report = CycleReport {
            fetched: sessions.len(),
            ..CycleReport::default()
        };

        let mut seen = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let mut tasks = JoinSet::new();
        for session in sessions {
            if !seen.insert(session.id.clone()) {
                debug!("Session {} listed twice in one fetch", session.id);
                report.skipped += 1;
                continue;
            }
            let monitor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                monitor.evaluate_session(session).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.tally(outcome),
                Err(e) => {
                    error!("Session evaluation task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        self.maintain(&seen).await;
        Ok(report)
    }

    /// Decides one session and enforces the decision at most once.
    ///
    /// The decision is written to the ledger before the terminate call, so a
    /// failed or repeated call never causes a second attempt.
    pub async fn evaluate_session(&self, mut session: Session) -> SessionOutcome {
        self.stamp_first_seen(&mut session);
        let Some(_claim) = self.claims.try_claim(&session.id) else {
            debug!("Session {} is already being evaluated", session.id);
            return SessionOutcome::InFlight;
        };

        match self.ledger.has_been_processed(&session.id).await {
            Ok(true) => return SessionOutcome::AlreadyProcessed,
            Ok(false) => {}
            Err(e) => {
                error!("Cannot check ledger for session {}: {}", session.id, e);
                return SessionOutcome::LedgerFailed;
            }
        }

        let classification = match self.classifier.classify(session.address).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(
                    "Allowing session {} of {} from {} unverified: {}",
                    session.id, session.user, session.address, e
                );
                return SessionOutcome::Unknown;
            }
        };

        if !self.is_flagged(classification.category) {
            let entry = LedgerEntry::new(
                &session.id,
                Decision::Allowed,
                session.address,
                &session.user,
                classification.category,
            );
            return match self.ledger.record(entry).await {
                Ok(_) => {
                    debug!(
                        "Allowed session {} of {} from {} ({})",
                        session.id, session.user, session.address, classification.category
                    );
                    SessionOutcome::Allowed
                }
                Err(e) => {
                    error!("Cannot record session {}: {}", session.id, e);
                    SessionOutcome::LedgerFailed
                }
            };
        }

        let decision = if self.settings.dry_run {
            Decision::WouldBlock
        } else {
            Decision::Blocked
        };
        let entry = LedgerEntry::new(
            &session.id,
            decision,
            session.address,
            &session.user,
            classification.category,
        );
        match self.ledger.record(entry).await {
            Ok(true) => {}
            Ok(false) => return SessionOutcome::AlreadyProcessed,
            Err(e) => {
                error!("Cannot record session {}, not enforcing: {}", session.id, e);
                return SessionOutcome::LedgerFailed;
            }
        }

        if self.settings.dry_run {
            info!(
                "[dry run] Would terminate session {} of {} from {} ({}, confidence {:.2})",
                session.id,
                session.user,
                session.address,
                classification.category,
                classification.confidence
            );
            return SessionOutcome::WouldBlock;
        }

        self.status.set_state(LoopState::Enforcing);
        match tokio::time::timeout(self.settings.request_timeout, self.enforcer.terminate(&session.id)).await {
            Ok(Ok(())) => {
                info!(
                    "Terminated session {} of {} from {} ({}, playing since {})",
                    session.id,
                    session.user,
                    session.address,
                    classification.category,
                    session.started_at.to_rfc3339()
                );
                SessionOutcome::Blocked
            }
            Ok(Err(e)) => {
                warn!("Could not terminate session {}: {}", session.id, e);
                SessionOutcome::EnforcementFailed
            }
            Err(_) => {
                warn!(
                    "Terminate call for session {} timed out after {:?}",
                    session.id, self.settings.request_timeout
                );
                SessionOutcome::EnforcementFailed
            }
        }
    }

    /// Replaces `started_at` with the time the session was first reported.
    pub(crate) fn stamp_first_seen(&self, session: &mut Session) {
        if let Ok(mut first_seen) = self.first_seen.lock() {
            session.started_at = *first_seen
                .entry(session.id.clone())
                .or_insert(session.started_at);
        }
    }

    /// Cache purge, first-seen bookkeeping and ledger retention. Sessions
    /// listed in the current fetch keep their ledger entry regardless of age.
    pub(crate) async fn maintain(&self, active: &HashSet<String>) {
        if let Ok(mut first_seen) = self.first_seen.lock() {
            first_seen.retain(|id, _| active.contains(id));
        }
        let purged = self.classifier.purge_expired();
        if purged > 0 {
            debug!("Dropped {} expired classifications", purged);
        }
        let Some(cutoff) = Utc::now().checked_sub_signed(self.settings.ledger_retention) else {
            return;
        };
        match self.ledger.prune(cutoff, active).await {
            Ok(0) => {}
            Ok(pruned) => debug!("Pruned {} ledger entries", pruned),
            Err(e) => warn!("Ledger prune failed: {}", e),
        }
    }
}
