//! In-memory store implementing both repository traits.
//!
//! One mutex guards requests and targets together, so the check-then-write
//! in every conditional operation is a single critical section.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{
    change_request::{ChangeRequest, ChangeRequestStatus},
    target::{TargetKind, TargetRecord},
    PaginationQuery,
};
use crate::repositories::{
    change_request::{
        ApprovalOutcome, ChangeRequestFilters, ChangeRequestRepositoryTrait, TargetWrite,
    },
    target::{target_not_found, TargetRepositoryTrait},
};
use crate::types::{ChangeRequestId, EntityId};

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order doubles as the tie-breaker for equal `submitted_at`.
    requests: Vec<ChangeRequest>,
    index: HashMap<ChangeRequestId, usize>,
    targets: HashMap<(TargetKind, EntityId), TargetRecord>,
}

impl MemoryState {
    fn request_mut(&mut self, id: ChangeRequestId) -> Option<&mut ChangeRequest> {
        let slot = *self.index.get(&id)?;
        self.requests.get_mut(slot)
    }

    fn live_target_at_version(&mut self, write: &TargetWrite) -> Option<&mut TargetRecord> {
        self.targets
            .get_mut(&(write.kind, write.id.clone()))
            .filter(|t| !t.deleted && t.version == write.expected_version)
    }
}

/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeRequestRepositoryTrait for InMemoryStore {
    async fn create(&self, request: &ChangeRequest) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.index.contains_key(&request.id) {
            return Err(AppError::Conflict(format!(
                "Change request {} already exists",
                request.id
            )));
        }
        let slot = state.requests.len();
        state.requests.push(request.clone());
        state.index.insert(request.id, slot);
        Ok(())
    }

    async fn find_by_id(&self, id: ChangeRequestId) -> Result<ChangeRequest, AppError> {
        let state = self.state.lock().await;
        state
            .index
            .get(&id)
            .and_then(|slot| state.requests.get(*slot))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Change request {} not found", id)))
    }

    async fn list(
        &self,
        filters: &ChangeRequestFilters,
        page: &PaginationQuery,
    ) -> Result<Vec<ChangeRequest>, AppError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&ChangeRequest> = state
            .requests
            .iter()
            .filter(|r| filters.matches(r))
            .collect();
        // Stable sort keeps insertion order for ties.
        matching.sort_by_key(|r| r.submitted_at);
        Ok(matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    async fn replace_if_status(
        &self,
        updated: &ChangeRequest,
        expected: ChangeRequestStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.request_mut(updated.id) {
            Some(current) if current.status == expected => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn approve_and_apply(
        &self,
        approved: &ChangeRequest,
        expected: ChangeRequestStatus,
        target: &TargetWrite,
    ) -> Result<ApprovalOutcome, AppError> {
        let mut state = self.state.lock().await;

        let request_ok = state
            .request_mut(approved.id)
            .is_some_and(|current| current.status == expected);
        if !request_ok {
            return Ok(ApprovalOutcome::RequestStale);
        }

        let Some(stored) = state.live_target_at_version(target) else {
            return Ok(ApprovalOutcome::TargetStale);
        };
        stored.document = target.document.clone();
        stored.version += 1;
        stored.updated_at = target.at;
        let stored = stored.clone();

        if let Some(current) = state.request_mut(approved.id) {
            *current = approved.clone();
        }

        Ok(ApprovalOutcome::Applied {
            request: approved.clone(),
            target: stored,
        })
    }
}

#[async_trait]
impl TargetRepositoryTrait for InMemoryStore {
    async fn create(&self, record: &TargetRecord) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let key = (record.kind, record.id.clone());
        if state.targets.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "{} {} already exists",
                record.kind, record.id
            )));
        }
        state.targets.insert(key, record.clone());
        Ok(())
    }

    async fn find(&self, kind: TargetKind, id: &EntityId) -> Result<TargetRecord, AppError> {
        let state = self.state.lock().await;
        state
            .targets
            .get(&(kind, id.clone()))
            .cloned()
            .ok_or_else(|| target_not_found(kind, id))
    }

    async fn update_if_version(
        &self,
        kind: TargetKind,
        id: &EntityId,
        expected_version: i64,
        document: &Value,
        at: DateTime<Utc>,
    ) -> Result<Option<TargetRecord>, AppError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state
            .targets
            .get_mut(&(kind, id.clone()))
            .filter(|t| !t.deleted && t.version == expected_version)
        else {
            return Ok(None);
        };
        stored.document = document.clone();
        stored.version += 1;
        stored.updated_at = at;
        Ok(Some(stored.clone()))
    }

    async fn soft_delete(
        &self,
        kind: TargetKind,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<TargetRecord, AppError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state
            .targets
            .get_mut(&(kind, id.clone()))
            .filter(|t| !t.deleted)
        else {
            return Err(target_not_found(kind, id));
        };
        stored.deleted = true;
        stored.version += 1;
        stored.updated_at = at;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::change_request::FieldChanges;
    use crate::types::UserId;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap()
    }

    fn entity(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    fn pending(target: &str, submitted_at: DateTime<Utc>) -> ChangeRequest {
        let mut changes = FieldChanges::new();
        changes.insert("name".into(), json!("Finance"));
        ChangeRequest::new(
            TargetKind::Department,
            entity(target),
            changes,
            UserId::parse("U1").unwrap(),
            None,
            ChangeRequestStatus::Pending,
            submitted_at,
        )
    }

    async fn seeded_target(store: &InMemoryStore) -> TargetRecord {
        let record = TargetRecord::new(
            TargetKind::Department,
            entity("D1"),
            json!({ "code": "FIN", "name": "Fin" }),
            at(0),
        );
        TargetRepositoryTrait::create(store, &record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn list_orders_by_submission_then_insertion() {
        let store = InMemoryStore::new();
        let late = pending("D1", at(5));
        let early_a = pending("D2", at(1));
        let early_b = pending("D3", at(1));
        for request in [&late, &early_a, &early_b] {
            ChangeRequestRepositoryTrait::create(&store, request).await.unwrap();
        }

        let listed = store
            .list(&ChangeRequestFilters::default(), &PaginationQuery::default())
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![early_a.id, early_b.id, late.id]);

        let page = PaginationQuery { limit: 1, offset: 1 };
        let listed = store.list(&ChangeRequestFilters::default(), &page).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, early_b.id);
    }

    #[tokio::test]
    async fn replace_if_status_refuses_stale_writers() {
        let store = InMemoryStore::new();
        let request = pending("D1", at(0));
        ChangeRequestRepositoryTrait::create(&store, &request).await.unwrap();

        let rejected = request
            .transitioned(
                ChangeRequestStatus::Rejected,
                &UserId::parse("A1").unwrap(),
                None,
                at(1),
            )
            .unwrap();
        assert!(store
            .replace_if_status(&rejected, ChangeRequestStatus::Pending)
            .await
            .unwrap());
        assert!(!store
            .replace_if_status(&rejected, ChangeRequestStatus::Pending)
            .await
            .unwrap());
        assert_eq!(
            store.find_by_id(request.id).await.unwrap().status,
            ChangeRequestStatus::Rejected
        );
    }

    #[tokio::test]
    async fn approve_and_apply_writes_both_or_neither() {
        let store = InMemoryStore::new();
        let target = seeded_target(&store).await;
        let request = pending("D1", at(0));
        ChangeRequestRepositoryTrait::create(&store, &request).await.unwrap();
        let approved = request
            .transitioned(
                ChangeRequestStatus::Approved,
                &UserId::parse("A1").unwrap(),
                None,
                at(2),
            )
            .unwrap();

        let stale_write = TargetWrite {
            kind: TargetKind::Department,
            id: entity("D1"),
            expected_version: target.version + 1,
            document: json!({ "code": "FIN", "name": "Finance" }),
            at: at(2),
        };
        let outcome = store
            .approve_and_apply(&approved, ChangeRequestStatus::Pending, &stale_write)
            .await
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::TargetStale);
        assert_eq!(
            store.find_by_id(request.id).await.unwrap().status,
            ChangeRequestStatus::Pending
        );

        let write = TargetWrite {
            expected_version: target.version,
            ..stale_write
        };
        let outcome = store
            .approve_and_apply(&approved, ChangeRequestStatus::Pending, &write)
            .await
            .unwrap();
        let ApprovalOutcome::Applied { request: stored, target: updated } = outcome else {
            panic!("expected approval to apply");
        };
        assert_eq!(stored.status, ChangeRequestStatus::Approved);
        assert_eq!(updated.version, 2);
        assert_eq!(updated.document["name"], "Finance");

        let outcome = store
            .approve_and_apply(&approved, ChangeRequestStatus::Pending, &write)
            .await
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::RequestStale);
    }

    #[tokio::test]
    async fn target_versioning_and_soft_delete() {
        let store = InMemoryStore::new();
        let target = seeded_target(&store).await;

        assert!(matches!(
            TargetRepositoryTrait::create(&store, &target).await,
            Err(AppError::Conflict(_))
        ));

        let updated = store
            .update_if_version(
                TargetKind::Department,
                &entity("D1"),
                1,
                &json!({ "code": "FIN", "name": "Finance" }),
                at(3),
            )
            .await
            .unwrap()
            .expect("version matched");
        assert_eq!(updated.version, 2);

        let stale = store
            .update_if_version(TargetKind::Department, &entity("D1"), 1, &json!({}), at(4))
            .await
            .unwrap();
        assert!(stale.is_none());

        let deleted = store
            .soft_delete(TargetKind::Department, &entity("D1"), at(5) + Duration::seconds(1))
            .await
            .unwrap();
        assert!(deleted.deleted);
        assert!(matches!(
            store.soft_delete(TargetKind::Department, &entity("D1"), at(6)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.find(TargetKind::Department, &entity("D1")).await.unwrap().deleted);
    }
}
