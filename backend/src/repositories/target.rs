//! Target entity repository.
//!
//! Targets are stored as versioned JSON documents keyed by `(kind, id)`.
//! Writers present the version they read and lose if it moved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, PgPool};

use crate::error::AppError;
use crate::models::target::{TargetKind, TargetRecord};
use crate::types::EntityId;

/// Repository trait for target entities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetRepositoryTrait: Send + Sync {
    /// Insert a new record. `Conflict` if `(kind, id)` is already taken,
    /// including by a soft-deleted record.
    async fn create(&self, record: &TargetRecord) -> Result<(), AppError>;

    /// Fetch a record, deleted or not. `NotFound` when absent.
    async fn find(&self, kind: TargetKind, id: &EntityId) -> Result<TargetRecord, AppError>;

    /// Replace the document if the stored version equals `expected_version`
    /// and the record is live. Returns the new record, or `None` if the guard
    /// failed.
    async fn update_if_version(
        &self,
        kind: TargetKind,
        id: &EntityId,
        expected_version: i64,
        document: &Value,
        at: DateTime<Utc>,
    ) -> Result<Option<TargetRecord>, AppError>;

    /// Mark a live record deleted. `NotFound` when absent or already deleted.
    async fn soft_delete(
        &self,
        kind: TargetKind,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<TargetRecord, AppError>;
}

pub(crate) const TARGET_COLUMNS: &str = "kind, id, document, version, deleted, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TargetRow {
    kind: String,
    id: EntityId,
    document: Json<Value>,
    version: i64,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TargetRow> for TargetRecord {
    type Error = AppError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse().map_err(|e| {
            AppError::InternalServerError(anyhow::anyhow!("corrupt target row: {e}"))
        })?;
        Ok(TargetRecord {
            kind,
            id: row.id,
            document: row.document.0,
            version: row.version,
            deleted: row.deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn target_not_found(kind: TargetKind, id: &EntityId) -> AppError {
    AppError::NotFound(format!("{} {} not found", kind, id))
}

/// PostgreSQL implementation of [`TargetRepositoryTrait`].
#[derive(Debug, Clone)]
pub struct PgTargetRepository {
    pool: PgPool,
}

impl PgTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepositoryTrait for PgTargetRepository {
    async fn create(&self, record: &TargetRecord) -> Result<(), AppError> {
        let affected = sqlx::query(
            "INSERT INTO target_entities (kind, id, document, version, deleted, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (kind, id) DO NOTHING",
        )
        .bind(record.kind.as_str())
        .bind(&record.id)
        .bind(Json(&record.document))
        .bind(record.version)
        .bind(record.deleted)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::Conflict(format!(
                "{} {} already exists",
                record.kind, record.id
            )));
        }
        Ok(())
    }

    async fn find(&self, kind: TargetKind, id: &EntityId) -> Result<TargetRecord, AppError> {
        let query = format!(
            "SELECT {} FROM target_entities WHERE kind = $1 AND id = $2",
            TARGET_COLUMNS
        );
        sqlx::query_as::<_, TargetRow>(&query)
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| target_not_found(kind, id))?
            .try_into()
    }

    async fn update_if_version(
        &self,
        kind: TargetKind,
        id: &EntityId,
        expected_version: i64,
        document: &Value,
        at: DateTime<Utc>,
    ) -> Result<Option<TargetRecord>, AppError> {
        let query = format!(
            "UPDATE target_entities
             SET document = $1, version = version + 1, updated_at = $2
             WHERE kind = $3 AND id = $4 AND version = $5 AND NOT deleted
             RETURNING {}",
            TARGET_COLUMNS
        );
        sqlx::query_as::<_, TargetRow>(&query)
            .bind(Json(document))
            .bind(at)
            .bind(kind.as_str())
            .bind(id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?
            .map(TargetRecord::try_from)
            .transpose()
    }

    async fn soft_delete(
        &self,
        kind: TargetKind,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<TargetRecord, AppError> {
        let query = format!(
            "UPDATE target_entities
             SET deleted = TRUE, version = version + 1, updated_at = $1
             WHERE kind = $2 AND id = $3 AND NOT deleted
             RETURNING {}",
            TARGET_COLUMNS
        );
        sqlx::query_as::<_, TargetRow>(&query)
            .bind(at)
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| target_not_found(kind, id))?
            .try_into()
    }
}
