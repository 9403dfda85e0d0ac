use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{error, info, warn};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Schema,
};

use crate::error_handling::types::LedgerError;
use crate::ledger::db_entities::{ActiveModel, Column, Entity, Model};
use crate::ledger::ledger_trait::Ledger;
use crate::ledger::types::{Decision, LedgerEntry};

/// SQLite ledger through SeaORM.
///
/// Uniqueness is enforced by the primary key: `record` is an
/// `INSERT .. ON CONFLICT(session_id) DO NOTHING`, so two writers racing on
/// the same session id cannot both succeed.
pub struct DatabaseLedger {
    db: DatabaseConnection,
}

impl DatabaseLedger {
    /// Create or open the database file at `path`.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create ledger dir {}: {}", parent.display(), e);
                LedgerError::WriteFailed
            })?;
        }
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = Database::connect(url).await.map_err(|e| {
            error!("Failed to open ledger database {}: {}", path.display(), e);
            LedgerError::ConnectionFailed
        })?;

        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let mut create = schema.create_table_from_entity(Entity);
        create.if_not_exists();
        db.execute(backend.build(&create)).await.map_err(|e| {
            error!("Failed to create ledger schema: {}", e);
            LedgerError::WriteFailed
        })?;

        info!("Database ledger opened at {}", path.display());
        Ok(Self { db })
    }

    fn to_active_model(entry: &LedgerEntry) -> ActiveModel {
        ActiveModel {
            session_id: Set(entry.session_id.clone()),
            decision: Set(entry.decision.as_str().to_string()),
            recorded_at: Set(entry.recorded_at.timestamp_millis()),
            address: Set(entry.address.to_string()),
            user_name: Set(entry.user.clone()),
            category: Set(entry.category.as_str().to_string()),
        }
    }

    fn from_model(model: Model) -> Option<LedgerEntry> {
        Some(LedgerEntry {
            decision: Decision::parse(&model.decision)?,
            recorded_at: Utc.timestamp_millis_opt(model.recorded_at).single()?,
            address: model.address.parse().ok()?,
            category: model.category.parse().ok()?,
            user: model.user_name,
            session_id: model.session_id,
        })
    }
}

#[async_trait]
impl Ledger for DatabaseLedger {
    async fn has_been_processed(&self, session_id: &str) -> Result<bool, LedgerError> {
        let found = Entity::find_by_id(session_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| {
                error!("Ledger lookup failed for {}: {}", session_id, e);
                LedgerError::ReadFailed
            })?;
        Ok(found.is_some())
    }

    async fn record(&self, entry: LedgerEntry) -> Result<bool, LedgerError> {
        let inserted = Entity::insert(Self::to_active_model(&entry))
            .on_conflict(OnConflict::column(Column::SessionId).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                error!("Ledger insert failed for {}: {}", entry.session_id, e);
                LedgerError::WriteFailed
            })?;
        Ok(inserted > 0)
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let models = Entity::find()
            .order_by_asc(Column::RecordedAt)
            .all(&self.db)
            .await
            .map_err(|e| {
                error!("Ledger listing failed: {}", e);
                LedgerError::ReadFailed
            })?;
        Ok(models
            .into_iter()
            .filter_map(|m| {
                let id = m.session_id.clone();
                let entry = Self::from_model(m);
                if entry.is_none() {
                    warn!("Skipping unreadable ledger row {}", id);
                }
                entry
            })
            .collect())
    }

    async fn prune(
        &self,
        older_than: DateTime<Utc>,
        active: &HashSet<String>,
    ) -> Result<usize, LedgerError> {
        let result = Entity::delete_many()
            .filter(Column::RecordedAt.lt(older_than.timestamp_millis()))
            .filter(Column::SessionId.is_not_in(active.iter().cloned()))
            .exec(&self.db)
            .await
            .map_err(|e| {
                error!("Ledger prune failed: {}", e);
                LedgerError::WriteFailed
            })?;
        Ok(result.rows_affected as usize)
    }
}
