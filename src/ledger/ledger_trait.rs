//! Ledger Trait
//!
//! This module defines the `Ledger` trait, the interface shared by every
//! decision ledger backend.
//!
//! Implementors are responsible for:
//! - Answering whether a session id was already evaluated
//! - Recording the first decision for a session id and ignoring later ones
//! - Listing entries for the web interface
//! - Pruning entries past their retention
//!
//! All methods return a `Result` to handle potential backend errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error_handling::types::LedgerError;
use crate::ledger::types::LedgerEntry;

/// The `Ledger` trait guarantees at-most-once enforcement within the
/// lifetime of the backend: once a session id is recorded, every later
/// `record` for that id is a no-op and `has_been_processed` answers `true`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether a decision was already recorded for `session_id`.
    async fn has_been_processed(&self, session_id: &str) -> Result<bool, LedgerError>;

    /// Records `entry` unless its session id already has one.
    ///
    /// Returns `true` when the entry was written, `false` when an earlier
    /// decision was kept.
    async fn record(&self, entry: LedgerEntry) -> Result<bool, LedgerError>;

    /// Retrieves every entry, oldest first.
    async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Removes entries recorded before `older_than`, returns how many.
    ///
    /// Entries whose session id is in `active` are kept whatever their age:
    /// dropping them would let a still running session be enforced again.
    async fn prune(
        &self,
        older_than: DateTime<Utc>,
        active: &HashSet<String>,
    ) -> Result<usize, LedgerError>;
}
