use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Phase the monitor loop is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Fetching,
    Evaluating,
    Enforcing,
    Sleeping,
    Terminating,
}

/// What happened to one session during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The ledger already holds a decision for this session
    AlreadyProcessed,
    /// Another worker is evaluating the same session right now
    InFlight,
    Allowed,
    Blocked,
    WouldBlock,
    /// Classification failed; allowed for now and re-evaluated next cycle
    Unknown,
    /// Recorded as blocked but the terminate call failed
    EnforcementFailed,
    /// The ledger could not be read or written; nothing was enforced
    LedgerFailed,
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub skipped: usize,
    pub allowed: usize,
    pub blocked: usize,
    pub would_block: usize,
    pub unknown: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn tally(&mut self, outcome: SessionOutcome) {
        match outcome {
            SessionOutcome::AlreadyProcessed | SessionOutcome::InFlight => self.skipped += 1,
            SessionOutcome::Allowed => self.allowed += 1,
            SessionOutcome::Blocked => self.blocked += 1,
            SessionOutcome::WouldBlock => self.would_block += 1,
            SessionOutcome::Unknown => self.unknown += 1,
            SessionOutcome::EnforcementFailed | SessionOutcome::LedgerFailed => self.failed += 1,
        }
    }
}

/// Snapshot served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub state: LoopState,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
    pub cycles_completed: u64,
    pub consecutive_failures: u32,
}

/// Shared, cheaply cloneable handle on the monitor status.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<MonitorStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MonitorStatus {
                state: LoopState::Idle,
                started_at: Utc::now(),
                last_cycle_at: None,
                last_cycle: None,
                last_error: None,
                cycles_completed: 0,
                consecutive_failures: 0,
            })),
        }
    }

    pub fn snapshot(&self) -> Option<MonitorStatus> {
        self.inner.read().ok().map(|s| s.clone())
    }

    pub fn state(&self) -> Option<LoopState> {
        self.inner.read().ok().map(|s| s.state)
    }

    pub fn set_state(&self, state: LoopState) {
        if let Ok(mut status) = self.inner.write() {
            status.state = state;
        }
    }

    pub fn record_cycle(&self, report: CycleReport) {
        if let Ok(mut status) = self.inner.write() {
            status.last_cycle_at = Some(Utc::now());
            status.last_cycle = Some(report);
            status.last_error = None;
            status.cycles_completed += 1;
            status.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&self, error: String) {
        if let Ok(mut status) = self.inner.write() {
            status.last_error = Some(error);
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_groups_outcomes() {
        let mut report = CycleReport::default();
        for outcome in [
            SessionOutcome::AlreadyProcessed,
            SessionOutcome::InFlight,
            SessionOutcome::Allowed,
            SessionOutcome::Blocked,
            SessionOutcome::WouldBlock,
            SessionOutcome::Unknown,
            SessionOutcome::EnforcementFailed,
            SessionOutcome::LedgerFailed,
        ] {
            report.tally(outcome);
        }
        assert_eq!(report.skipped, 2);
        assert_eq!(report.allowed, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.would_block, 1);
        assert_eq!(report.unknown, 1);
        assert_eq!(report.failed, 2);
    }

    #[test]
    fn successful_cycle_clears_failures() {
        let status = StatusHandle::new();
        status.record_failure("connection refused".into());
        status.record_failure("connection refused".into());
        let snapshot = status.snapshot().unwrap();
        assert_eq!(snapshot.consecutive_failures, 2);
        assert_eq!(snapshot.state, LoopState::Idle);

        status.record_cycle(CycleReport::default());
        let snapshot = status.snapshot().unwrap();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.cycles_completed, 1);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_cycle_at.is_some());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&LoopState::Sleeping).unwrap();
        assert_eq!(json, "\"sleeping\"");
    }
}
