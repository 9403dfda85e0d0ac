use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::classification::types::Category;

/// Outcome recorded for an evaluated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Blocked,
    /// Flagged while running in dry-run mode, nothing was terminated
    WouldBlock,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Blocked => "blocked",
            Decision::WouldBlock => "would_block",
        }
    }

    pub fn parse(s: &str) -> Option<Decision> {
        match s {
            "allowed" => Some(Decision::Allowed),
            "blocked" => Some(Decision::Blocked),
            "would_block" => Some(Decision::WouldBlock),
            _ => None,
        }
    }
}

/// One row of the ledger. At most one entry exists per session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub session_id: String,
    pub decision: Decision,
    pub recorded_at: DateTime<Utc>,
    pub address: IpAddr,
    pub user: String,
    pub category: Category,
}

impl LedgerEntry {
    pub fn new(
        session_id: impl Into<String>,
        decision: Decision,
        address: IpAddr,
        user: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            decision,
            recorded_at: Utc::now(),
            address,
            user: user.into(),
            category,
        }
    }
}
