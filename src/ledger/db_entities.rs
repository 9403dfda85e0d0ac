//! SeaORM entity model used by the database ledger backend.
//!
//! Maps to the `ledger_entries` SQLite table created by `database_ledger`.

use sea_orm::entity::prelude::*;

/// Ledger table entity model.
///
/// Addresses, categories and decisions are stored as strings for
/// portability; the timestamp is stored as unix milliseconds so pruning can
/// compare numerically.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    /// Media server session id
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: String,
    /// `allowed`, `blocked` or `would_block`
    pub decision: String,
    /// Unix milliseconds
    pub recorded_at: i64,
    pub address: String,
    pub user_name: String,
    pub category: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
