use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error_handling::types::LedgerError;
use crate::ledger::ledger_trait::Ledger;
use crate::ledger::types::LedgerEntry;

/// Process-local ledger. Cleared on restart, sessions are then re-evaluated.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn has_been_processed(&self, session_id: &str) -> Result<bool, LedgerError> {
        let entries = self.entries.lock().map_err(|e| {
            error!("Ledger lock poisoned: {}", e);
            LedgerError::ReadFailed
        })?;
        Ok(entries.contains_key(session_id))
    }

    async fn record(&self, entry: LedgerEntry) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().map_err(|e| {
            error!("Ledger lock poisoned: {}", e);
            LedgerError::WriteFailed
        })?;
        if entries.contains_key(&entry.session_id) {
            debug!("Session {} already recorded, keeping first decision", entry.session_id);
            return Ok(false);
        }
        entries.insert(entry.session_id.clone(), entry);
        Ok(true)
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.lock().map_err(|_| LedgerError::ReadFailed)?;
        let mut list: Vec<LedgerEntry> = entries.values().cloned().collect();
        list.sort_by_key(|e| e.recorded_at);
        Ok(list)
    }

    async fn prune(
        &self,
        older_than: DateTime<Utc>,
        active: &HashSet<String>,
    ) -> Result<usize, LedgerError> {
        let mut entries = self.entries.lock().map_err(|_| LedgerError::WriteFailed)?;
        let before = entries.len();
        entries.retain(|id, e| e.recorded_at >= older_than || active.contains(id));
        Ok(before - entries.len())
    }
}
