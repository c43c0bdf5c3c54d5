//! Direct maintenance of target entities by their owning domain's approvers.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AppError;
use crate::models::{
    role::Caller,
    target::{validate_document, TargetKind, TargetRecord},
};
use crate::repositories::{target::target_not_found, TargetRepositoryTrait};
use crate::services::authorization::{AuthorizationPolicy, WorkflowAction};
use crate::types::EntityId;
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct TargetService {
    targets: Arc<dyn TargetRepositoryTrait>,
    policy: Arc<dyn AuthorizationPolicy>,
    clock: Arc<dyn Clock>,
}

impl TargetService {
    pub fn new(
        targets: Arc<dyn TargetRepositoryTrait>,
        policy: Arc<dyn AuthorizationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets,
            policy,
            clock,
        }
    }

    fn authorize(&self, caller: &Caller, kind: TargetKind) -> Result<(), AppError> {
        if self
            .policy
            .permits(caller.role, WorkflowAction::ManageTargets, kind.domain())
        {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} may not maintain {} records",
                caller.role, kind
            )))
        }
    }

    pub async fn create(
        &self,
        caller: &Caller,
        kind: TargetKind,
        id: EntityId,
        document: &Value,
    ) -> Result<TargetRecord, AppError> {
        self.authorize(caller, kind)?;
        let document = validate_document(kind, document)?;
        let record = TargetRecord::new(kind, id, document, self.clock.now());
        self.targets.create(&record).await?;
        tracing::info!(
            target_kind = %kind,
            target_entity_id = %record.id,
            actor = %caller.user_id,
            "Target created"
        );
        Ok(record)
    }

    /// Any caller may read a live record.
    pub async fn get(&self, kind: TargetKind, id: &EntityId) -> Result<TargetRecord, AppError> {
        let record = self.targets.find(kind, id).await?;
        if record.deleted {
            return Err(target_not_found(kind, id));
        }
        Ok(record)
    }

    /// Replaces the whole document. `expected_version` must match the stored
    /// version or the update is refused with `Conflict`.
    pub async fn update(
        &self,
        caller: &Caller,
        kind: TargetKind,
        id: &EntityId,
        expected_version: i64,
        document: &Value,
    ) -> Result<TargetRecord, AppError> {
        self.authorize(caller, kind)?;
        let document = validate_document(kind, document)?;

        if let Some(updated) = self
            .targets
            .update_if_version(kind, id, expected_version, &document, self.clock.now())
            .await?
        {
            tracing::info!(
                target_kind = %kind,
                target_entity_id = %id,
                version = updated.version,
                actor = %caller.user_id,
                "Target updated"
            );
            return Ok(updated);
        }

        let current = self.get(kind, id).await?;
        Err(AppError::Conflict(format!(
            "{} {} is at version {}, not {}",
            kind, id, current.version, expected_version
        )))
    }

    pub async fn delete(
        &self,
        caller: &Caller,
        kind: TargetKind,
        id: &EntityId,
    ) -> Result<TargetRecord, AppError> {
        self.authorize(caller, kind)?;
        let record = self.targets.soft_delete(kind, id, self.clock.now()).await?;
        tracing::info!(
            target_kind = %kind,
            target_entity_id = %id,
            actor = %caller.user_id,
            "Target deleted"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::SystemRole;
    use crate::repositories::InMemoryStore;
    use crate::services::authorization::RolePolicy;
    use crate::types::UserId;
    use crate::utils::time::SystemClock;
    use serde_json::json;

    fn service() -> TargetService {
        TargetService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(RolePolicy::new()),
            Arc::new(SystemClock::new(chrono_tz::UTC)),
        )
    }

    fn admin() -> Caller {
        Caller::new(UserId::parse("A1").unwrap(), SystemRole::SystemAdmin)
    }

    fn entity(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn create_validates_and_versions() {
        let service = service();
        let record = service
            .create(
                &admin(),
                TargetKind::Department,
                entity("D1"),
                &json!({ "code": "FIN", "name": "Finance" }),
            )
            .await
            .unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.document["isActive"], true);

        let bad = service
            .create(&admin(), TargetKind::Department, entity("D2"), &json!({ "code": "fin", "name": "x" }))
            .await;
        assert!(matches!(bad, Err(AppError::Validation(_))));

        let duplicate = service
            .create(&admin(), TargetKind::Department, entity("D1"), &json!({ "code": "FIN", "name": "Finance" }))
            .await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let service = service();
        service
            .create(&admin(), TargetKind::Department, entity("D1"), &json!({ "code": "FIN", "name": "Finance" }))
            .await
            .unwrap();

        let doc = json!({ "code": "FIN", "name": "Finance & Accounting" });
        let updated = service
            .update(&admin(), TargetKind::Department, &entity("D1"), 1, &doc)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let stale = service
            .update(&admin(), TargetKind::Department, &entity("D1"), 1, &doc)
            .await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleted_targets_disappear() {
        let service = service();
        service
            .create(&admin(), TargetKind::Department, entity("D1"), &json!({ "code": "FIN", "name": "Finance" }))
            .await
            .unwrap();
        service
            .delete(&admin(), TargetKind::Department, &entity("D1"))
            .await
            .unwrap();

        assert!(matches!(
            service.get(TargetKind::Department, &entity("D1")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service
                .update(&admin(), TargetKind::Department, &entity("D1"), 2, &json!({ "code": "FIN", "name": "x" }))
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn maintenance_requires_domain_role() {
        let service = service();
        let employee = Caller::new(UserId::parse("U1").unwrap(), SystemRole::DepartmentEmployee);
        let result = service
            .create(&employee, TargetKind::Department, entity("D1"), &json!({ "code": "FIN", "name": "Finance" }))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
