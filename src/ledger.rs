//! Decision ledger
//!
//! This module records which sessions have already been evaluated and what
//! was decided, so a session is enforced against at most once.
//!
//! Components:
//! - `ledger_trait`: the Ledger trait defining a uniform API.
//! - `types`: `Decision` and `LedgerEntry`.
//! - `memory_ledger`: in-process implementation, cleared on restart.
//! - `file_ledger`: JSON lines file, survives restarts.
//! - `database_ledger`: ORM-based SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity model for the database backend.

use std::sync::Arc;

use crate::configuration::types::{LedgerBackend, LedgerConfig};
use crate::error_handling::types::LedgerError;

pub mod database_ledger;
pub mod db_entities;
pub mod file_ledger;
pub mod ledger_trait;
pub mod memory_ledger;
pub mod types;

pub use database_ledger::DatabaseLedger;
pub use file_ledger::FileLedger;
pub use ledger_trait::Ledger;
pub use memory_ledger::MemoryLedger;
pub use types::{Decision, LedgerEntry};

/// Opens the backend selected in the configuration.
pub async fn open_ledger(config: &LedgerConfig) -> Result<Arc<dyn Ledger>, LedgerError> {
    let ledger: Arc<dyn Ledger> = match config.backend {
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
        LedgerBackend::File => Arc::new(FileLedger::open(config.resolved_path())?),
        LedgerBackend::Database => Arc::new(DatabaseLedger::open(config.resolved_path()).await?),
    };
    Ok(ledger)
}
