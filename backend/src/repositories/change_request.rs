//! Change request repository.
//!
//! Every status write is conditional on the status the caller read, so two
//! resolvers racing on the same request can never both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::models::{
    change_request::{
        ChangeRequest, ChangeRequestDomain, ChangeRequestStatus, FieldChanges, StatusChange,
    },
    target::{TargetKind, TargetRecord},
    PaginationQuery,
};
use crate::repositories::{
    common::push_clause,
    target::{TargetRow, TARGET_COLUMNS},
};
use crate::types::{ChangeRequestId, EntityId, UserId};

/// Optional filters for listing change requests. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequestFilters {
    pub status: Option<ChangeRequestStatus>,
    pub domain: Option<ChangeRequestDomain>,
    pub target_kind: Option<TargetKind>,
    pub target_entity_id: Option<EntityId>,
    pub requested_by: Option<UserId>,
    /// Limits results to what one caller may read.
    pub visible_to: Option<RequestScope>,
}

/// Requests a caller may read: their own, plus every request in the domains
/// they approve in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub requester: UserId,
    pub approved_domains: Vec<ChangeRequestDomain>,
}

impl RequestScope {
    pub fn allows(&self, request: &ChangeRequest) -> bool {
        request.requested_by == self.requester || self.approved_domains.contains(&request.domain)
    }
}

impl ChangeRequestFilters {
    pub fn matches(&self, request: &ChangeRequest) -> bool {
        self.status.map_or(true, |s| s == request.status)
            && self.domain.map_or(true, |d| d == request.domain)
            && self.target_kind.map_or(true, |k| k == request.target_kind)
            && self
                .target_entity_id
                .as_ref()
                .map_or(true, |id| id == &request.target_entity_id)
            && self
                .requested_by
                .as_ref()
                .map_or(true, |u| u == &request.requested_by)
            && self
                .visible_to
                .as_ref()
                .map_or(true, |scope| scope.allows(request))
    }
}

/// New target document written as part of an approval.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWrite {
    pub kind: TargetKind,
    pub id: EntityId,
    /// Version the approver read; the write fails if the stored one differs.
    pub expected_version: i64,
    pub document: Value,
    pub at: DateTime<Utc>,
}

/// Result of [`ChangeRequestRepositoryTrait::approve_and_apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Applied {
        request: ChangeRequest,
        target: TargetRecord,
    },
    /// The request left the expected status before we could write it.
    RequestStale,
    /// The target's version moved (or it was deleted) since it was read.
    TargetStale,
}

/// Repository trait for change request persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeRequestRepositoryTrait: Send + Sync {
    /// Persist a new request.
    async fn create(&self, request: &ChangeRequest) -> Result<(), AppError>;

    /// Find a request by ID. `NotFound` when absent.
    async fn find_by_id(&self, id: ChangeRequestId) -> Result<ChangeRequest, AppError>;

    /// Requests matching `filters`, oldest submission first.
    async fn list(
        &self,
        filters: &ChangeRequestFilters,
        page: &PaginationQuery,
    ) -> Result<Vec<ChangeRequest>, AppError>;

    /// Overwrites the stored request with `updated` only if its status is still
    /// `expected`. Returns whether the write happened.
    async fn replace_if_status(
        &self,
        updated: &ChangeRequest,
        expected: ChangeRequestStatus,
    ) -> Result<bool, AppError>;

    /// Stores the approved request and the new target document atomically.
    /// Neither write happens unless both guards hold.
    async fn approve_and_apply(
        &self,
        approved: &ChangeRequest,
        expected: ChangeRequestStatus,
        target: &TargetWrite,
    ) -> Result<ApprovalOutcome, AppError>;
}

const CHANGE_REQUEST_COLUMNS: &str = "id, domain, target_kind, target_entity_id, \
     requested_changes, status, requested_by, resolved_by, reason, resolution_comments, \
     submitted_at, resolved_at, implemented_at, updated_at, history";

#[derive(Debug, sqlx::FromRow)]
struct ChangeRequestRow {
    id: ChangeRequestId,
    domain: String,
    target_kind: String,
    target_entity_id: EntityId,
    requested_changes: Json<FieldChanges>,
    status: String,
    requested_by: UserId,
    resolved_by: Option<UserId>,
    reason: Option<String>,
    resolution_comments: Option<String>,
    submitted_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    implemented_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    history: Json<Vec<StatusChange>>,
}

impl TryFrom<ChangeRequestRow> for ChangeRequest {
    type Error = AppError;

    fn try_from(row: ChangeRequestRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::models::UnknownToken| {
            AppError::InternalServerError(anyhow::anyhow!("corrupt change request row: {e}"))
        };
        Ok(ChangeRequest {
            id: row.id,
            domain: row.domain.parse().map_err(corrupt)?,
            target_kind: row.target_kind.parse().map_err(corrupt)?,
            target_entity_id: row.target_entity_id,
            requested_changes: row.requested_changes.0,
            status: row.status.parse().map_err(corrupt)?,
            requested_by: row.requested_by,
            resolved_by: row.resolved_by,
            reason: row.reason,
            resolution_comments: row.resolution_comments,
            submitted_at: row.submitted_at,
            resolved_at: row.resolved_at,
            implemented_at: row.implemented_at,
            updated_at: row.updated_at,
            history: row.history.0,
        })
    }
}

/// PostgreSQL implementation of [`ChangeRequestRepositoryTrait`].
#[derive(Debug, Clone)]
pub struct PgChangeRequestRepository {
    pool: PgPool,
}

impl PgChangeRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &ChangeRequestFilters) {
    let mut has_clause = false;
    if let Some(status) = filters.status {
        push_clause(builder, &mut has_clause);
        builder.push("status = ").push_bind(status.as_str());
    }
    if let Some(domain) = filters.domain {
        push_clause(builder, &mut has_clause);
        builder.push("domain = ").push_bind(domain.as_str());
    }
    if let Some(kind) = filters.target_kind {
        push_clause(builder, &mut has_clause);
        builder.push("target_kind = ").push_bind(kind.as_str());
    }
    if let Some(id) = filters.target_entity_id.as_ref() {
        push_clause(builder, &mut has_clause);
        builder.push("target_entity_id = ").push_bind(id.as_str().to_string());
    }
    if let Some(user) = filters.requested_by.as_ref() {
        push_clause(builder, &mut has_clause);
        builder.push("requested_by = ").push_bind(user.as_str().to_string());
    }
    if let Some(scope) = filters.visible_to.as_ref() {
        push_clause(builder, &mut has_clause);
        let domains: Vec<String> = scope
            .approved_domains
            .iter()
            .map(|d| d.as_str().to_string())
            .collect();
        builder
            .push("(requested_by = ")
            .push_bind(scope.requester.as_str().to_string())
            .push(" OR domain = ANY(")
            .push_bind(domains)
            .push("))");
    }
}

const UPDATE_IF_STATUS: &str = "UPDATE change_requests
    SET requested_changes = $1, status = $2, resolved_by = $3, reason = $4,
        resolution_comments = $5, resolved_at = $6, implemented_at = $7,
        updated_at = $8, history = $9
    WHERE id = $10 AND status = $11";

fn bind_update<'q>(
    request: &'q ChangeRequest,
    expected: ChangeRequestStatus,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(UPDATE_IF_STATUS)
        .bind(Json(&request.requested_changes))
        .bind(request.status.as_str())
        .bind(request.resolved_by.as_ref())
        .bind(request.reason.as_deref())
        .bind(request.resolution_comments.as_deref())
        .bind(request.resolved_at)
        .bind(request.implemented_at)
        .bind(request.updated_at)
        .bind(Json(&request.history))
        .bind(request.id)
        .bind(expected.as_str())
}

#[async_trait]
impl ChangeRequestRepositoryTrait for PgChangeRequestRepository {
    async fn create(&self, request: &ChangeRequest) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO change_requests (
                id, domain, target_kind, target_entity_id, requested_changes, status,
                requested_by, resolved_by, reason, resolution_comments,
                submitted_at, resolved_at, implemented_at, updated_at, history
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
        )
        .bind(request.id)
        .bind(request.domain.as_str())
        .bind(request.target_kind.as_str())
        .bind(&request.target_entity_id)
        .bind(Json(&request.requested_changes))
        .bind(request.status.as_str())
        .bind(&request.requested_by)
        .bind(request.resolved_by.as_ref())
        .bind(request.reason.as_deref())
        .bind(request.resolution_comments.as_deref())
        .bind(request.submitted_at)
        .bind(request.resolved_at)
        .bind(request.implemented_at)
        .bind(request.updated_at)
        .bind(Json(&request.history))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ChangeRequestId) -> Result<ChangeRequest, AppError> {
        let query = format!(
            "SELECT {} FROM change_requests WHERE id = $1",
            CHANGE_REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Change request {} not found", id)))?;
        row.try_into()
    }

    async fn list(
        &self,
        filters: &ChangeRequestFilters,
        page: &PaginationQuery,
    ) -> Result<Vec<ChangeRequest>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM change_requests",
            CHANGE_REQUEST_COLUMNS
        ));
        push_filters(&mut builder, filters);
        builder
            .push(" ORDER BY submitted_at ASC, seq ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = builder
            .build_query_as::<ChangeRequestRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeRequest::try_from).collect()
    }

    async fn replace_if_status(
        &self,
        updated: &ChangeRequest,
        expected: ChangeRequestStatus,
    ) -> Result<bool, AppError> {
        let affected = bind_update(updated, expected)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected == 1)
    }

    async fn approve_and_apply(
        &self,
        approved: &ChangeRequest,
        expected: ChangeRequestStatus,
        target: &TargetWrite,
    ) -> Result<ApprovalOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let affected = bind_update(approved, expected)
            .execute(tx.as_mut())
            .await?
            .rows_affected();
        if affected == 0 {
            tx.rollback().await?;
            return Ok(ApprovalOutcome::RequestStale);
        }

        let query = format!(
            "UPDATE target_entities
             SET document = $1, version = version + 1, updated_at = $2
             WHERE kind = $3 AND id = $4 AND version = $5 AND NOT deleted
             RETURNING {}",
            TARGET_COLUMNS
        );
        let row = sqlx::query_as::<_, TargetRow>(&query)
            .bind(Json(&target.document))
            .bind(target.at)
            .bind(target.kind.as_str())
            .bind(&target.id)
            .bind(target.expected_version)
            .fetch_optional(tx.as_mut())
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(ApprovalOutcome::TargetStale);
        };

        tx.commit().await?;
        Ok(ApprovalOutcome::Applied {
            request: approved.clone(),
            target: row.try_into()?,
        })
    }
}
