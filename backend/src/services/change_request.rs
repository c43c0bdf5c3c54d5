//! The change request workflow.
//!
//! Every operation takes an explicit [`Caller`]. Status writes go through the
//! repository's compare-and-set so that concurrent callers are serialized by
//! the store rather than by this service.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AppError;
use crate::models::{
    change_request::{ChangeRequest, ChangeRequestDomain, ChangeRequestStatus, Decision, FieldChanges},
    role::Caller,
    target::{apply_to_document, canonical_changes, ensure_accepts_requests, TargetKind, TargetRecord},
    PaginationQuery,
};
use crate::repositories::{
    ApprovalOutcome, ChangeRequestFilters, ChangeRequestRepositoryTrait, RequestScope,
    TargetRepositoryTrait, TargetWrite,
};
use crate::services::authorization::{AuthorizationPolicy, WorkflowAction};
use crate::types::{ChangeRequestId, EntityId};
use crate::utils::time::Clock;
use crate::validation::rules::{validate_free_text, validate_requested_changes};

/// Attempts an approval makes when the target keeps moving under it.
pub const MAX_APPROVAL_ATTEMPTS: usize = 3;

/// Input for [`ChangeRequestService::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeRequest {
    pub target_kind: TargetKind,
    pub target_entity_id: EntityId,
    pub requested_changes: FieldChanges,
    pub reason: Option<String>,
    /// Save as DRAFT instead of PENDING. Only for domains with a draft stage.
    pub as_draft: bool,
}

#[derive(Clone)]
pub struct ChangeRequestService {
    requests: Arc<dyn ChangeRequestRepositoryTrait>,
    targets: Arc<dyn TargetRepositoryTrait>,
    policy: Arc<dyn AuthorizationPolicy>,
    clock: Arc<dyn Clock>,
}

impl ChangeRequestService {
    pub fn new(
        requests: Arc<dyn ChangeRequestRepositoryTrait>,
        targets: Arc<dyn TargetRepositoryTrait>,
        policy: Arc<dyn AuthorizationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            targets,
            policy,
            clock,
        }
    }

    fn authorize(
        &self,
        caller: &Caller,
        action: WorkflowAction,
        domain: ChangeRequestDomain,
    ) -> Result<(), AppError> {
        if self.policy.permits(caller.role, action, domain) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %caller.user_id,
            role = %caller.role,
            action = action.as_str(),
            domain = %domain,
            "Workflow action denied"
        );
        Err(AppError::Forbidden(format!(
            "Role {} may not {} {} change requests",
            caller.role,
            action.as_str(),
            domain
        )))
    }

    fn is_approver(&self, caller: &Caller, domain: ChangeRequestDomain) -> bool {
        self.policy.permits(caller.role, WorkflowAction::Resolve, domain)
            || self.policy.permits(caller.role, WorkflowAction::Review, domain)
    }

    fn ensure_requester(caller: &Caller, request: &ChangeRequest) -> Result<(), AppError> {
        if request.is_requested_by(&caller.user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only the requester may modify this change request".into(),
            ))
        }
    }

    /// Reads the target a request points at. Missing or deleted targets are a
    /// validation failure of the request, not a lookup failure.
    async fn live_target(&self, kind: TargetKind, id: &EntityId) -> Result<TargetRecord, AppError> {
        let target = match self.targets.find(kind, id).await {
            Ok(target) => target,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::validation(format!("{} {} does not exist", kind, id)))
            }
            Err(err) => return Err(err),
        };
        if target.deleted {
            return Err(AppError::validation(format!("{} {} has been deleted", kind, id)));
        }
        Ok(target)
    }

    /// Checks the proposal against the current target without writing anything.
    /// Returns the proposal in the form approval will store it, so the request
    /// records exactly what ends up on the target.
    async fn check_proposal(
        &self,
        kind: TargetKind,
        id: &EntityId,
        changes: &FieldChanges,
        reason: Option<&str>,
    ) -> Result<FieldChanges, AppError> {
        if validate_requested_changes(changes).is_err() {
            return Err(AppError::validation("requestedChanges must name at least one field"));
        }
        if let Some(field) = changes
            .keys()
            .find(|f| !kind.changeable_fields().contains(&f.as_str()))
        {
            return Err(AppError::validation(format!(
                "field `{}` cannot be changed on {}; allowed: {}",
                field,
                kind,
                kind.changeable_fields().join(", ")
            )));
        }
        check_text("reason", reason)?;

        let target = self.live_target(kind, id).await?;
        ensure_accepts_requests(kind, &target.document)?;
        Ok(canonical_changes(kind, &target.document, changes)?)
    }

    /// Moves `request` to `next` with a compare-and-set on its current status.
    async fn transition(
        &self,
        request: &ChangeRequest,
        next: ChangeRequestStatus,
        caller: &Caller,
        comment: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let updated = request.transitioned(next, &caller.user_id, comment, self.clock.now())?;
        if !self.requests.replace_if_status(&updated, request.status).await? {
            return Err(changed_concurrently(request.id));
        }
        log_transition(request.status, &updated, caller);
        Ok(updated)
    }

    pub async fn submit(
        &self,
        caller: &Caller,
        input: NewChangeRequest,
    ) -> Result<ChangeRequest, AppError> {
        let domain = input.target_kind.domain();
        self.authorize(caller, WorkflowAction::Submit, domain)?;

        if input.as_draft && !domain.lifecycle().has_draft {
            return Err(AppError::validation(format!(
                "{} change requests have no draft stage",
                domain
            )));
        }
        let requested_changes = self
            .check_proposal(
                input.target_kind,
                &input.target_entity_id,
                &input.requested_changes,
                input.reason.as_deref(),
            )
            .await?;

        let initial = if input.as_draft {
            ChangeRequestStatus::Draft
        } else {
            ChangeRequestStatus::Pending
        };
        let request = ChangeRequest::new(
            input.target_kind,
            input.target_entity_id,
            requested_changes,
            caller.user_id.clone(),
            input.reason,
            initial,
            self.clock.now(),
        );
        self.requests.create(&request).await?;

        tracing::info!(
            change_request_id = %request.id,
            domain = %request.domain,
            target_kind = %request.target_kind,
            target_entity_id = %request.target_entity_id,
            status = %request.status,
            requested_by = %request.requested_by,
            "Change request submitted"
        );
        Ok(request)
    }

    /// Requesters see their own requests; approvers of the domain see all.
    pub async fn get(&self, caller: &Caller, id: ChangeRequestId) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        if !request.is_requested_by(&caller.user_id) && !self.is_approver(caller, request.domain) {
            return Err(AppError::Forbidden(
                "Not allowed to view this change request".into(),
            ));
        }
        Ok(request)
    }

    /// Lists requests. Approvers see every request in the domains they approve
    /// in, plus their own; everyone else only ever sees their own requests.
    pub async fn list(
        &self,
        caller: &Caller,
        mut filters: ChangeRequestFilters,
        page: &PaginationQuery,
    ) -> Result<Vec<ChangeRequest>, AppError> {
        let approved_domains: Vec<ChangeRequestDomain> = ChangeRequestDomain::ALL
            .iter()
            .copied()
            .filter(|d| filters.domain.map_or(true, |wanted| wanted == *d))
            .filter(|d| self.is_approver(caller, *d))
            .collect();

        if approved_domains.is_empty() {
            match filters.requested_by.as_ref() {
                Some(user) if user != &caller.user_id => {
                    return Err(AppError::Forbidden(
                        "Only approvers may list other users' change requests".into(),
                    ));
                }
                _ => filters.requested_by = Some(caller.user_id.clone()),
            }
        } else if filters.domain.is_none() && approved_domains.len() < ChangeRequestDomain::ALL.len() {
            filters.visible_to = Some(RequestScope {
                requester: caller.user_id.clone(),
                approved_domains,
            });
        }
        self.requests.list(&filters, page).await
    }

    /// Replaces the proposal of a DRAFT or PENDING request.
    pub async fn update(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
        requested_changes: FieldChanges,
        reason: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        Self::ensure_requester(caller, &request)?;
        if !matches!(
            request.status,
            ChangeRequestStatus::Draft | ChangeRequestStatus::Pending
        ) {
            return Err(AppError::InvalidState(format!(
                "Change request {} is {} and can no longer be edited",
                id, request.status
            )));
        }
        let requested_changes = self
            .check_proposal(
                request.target_kind,
                &request.target_entity_id,
                &requested_changes,
                reason.as_deref(),
            )
            .await?;

        let updated = request.with_changes(requested_changes, reason, self.clock.now());
        if !self.requests.replace_if_status(&updated, request.status).await? {
            return Err(changed_concurrently(id));
        }
        tracing::info!(change_request_id = %id, "Change request edited");
        Ok(updated)
    }

    /// DRAFT -> PENDING, by the requester. The proposal is re-checked against
    /// the target as it is now.
    pub async fn submit_draft(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
    ) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        Self::ensure_requester(caller, &request)?;
        if request.status != ChangeRequestStatus::Draft {
            return Err(AppError::InvalidState(format!(
                "Change request {} is {}, not DRAFT",
                id, request.status
            )));
        }
        self.check_proposal(
            request.target_kind,
            &request.target_entity_id,
            &request.requested_changes,
            request.reason.as_deref(),
        )
        .await?;
        self.transition(&request, ChangeRequestStatus::Pending, caller, None)
            .await
    }

    /// PENDING -> UNDER_REVIEW, in domains with a review stage.
    pub async fn start_review(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
        comment: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        if !request.domain.lifecycle().has_review {
            return Err(AppError::InvalidState(format!(
                "{} change requests have no review stage",
                request.domain
            )));
        }
        self.authorize(caller, WorkflowAction::Review, request.domain)?;
        check_text("comment", comment.as_deref())?;
        self.transition(&request, ChangeRequestStatus::UnderReview, caller, comment)
            .await
    }

    /// Approves or rejects a PENDING or UNDER_REVIEW request.
    ///
    /// Approval re-reads the target, re-applies the proposal to it and writes
    /// the new document together with the status. If the target's version
    /// moves between read and write, the whole step is retried up to
    /// [`MAX_APPROVAL_ATTEMPTS`] times.
    pub async fn resolve(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        check_text("resolutionComments", comments.as_deref())?;

        for attempt in 1..=MAX_APPROVAL_ATTEMPTS {
            let request = self.requests.find_by_id(id).await?;
            self.authorize(caller, WorkflowAction::Resolve, request.domain)?;
            ensure_resolvable(&request)?;

            let next = decision.target_status();
            if next == ChangeRequestStatus::Rejected {
                return self.transition(&request, next, caller, comments.clone()).await;
            }

            let target = self
                .live_target(request.target_kind, &request.target_entity_id)
                .await?;
            ensure_accepts_requests(request.target_kind, &target.document)?;
            let document: Value = apply_to_document(
                request.target_kind,
                &target.document,
                &request.requested_changes,
            )?;
            let now = self.clock.now();
            let approved = request.transitioned(
                next,
                &caller.user_id,
                comments.clone(),
                now,
            )?;
            let write = TargetWrite {
                kind: target.kind,
                id: target.id.clone(),
                expected_version: target.version,
                document,
                at: now,
            };

            match self
                .requests
                .approve_and_apply(&approved, request.status, &write)
                .await?
            {
                ApprovalOutcome::Applied { request: stored, target } => {
                    log_transition(request.status, &stored, caller);
                    tracing::info!(
                        change_request_id = %stored.id,
                        target_kind = %target.kind,
                        target_entity_id = %target.id,
                        version = target.version,
                        "Approved changes applied to target"
                    );
                    return Ok(stored);
                }
                ApprovalOutcome::RequestStale => return Err(changed_concurrently(id)),
                ApprovalOutcome::TargetStale => {
                    tracing::warn!(
                        change_request_id = %id,
                        attempt,
                        expected_version = target.version,
                        "Target changed during approval; retrying"
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "Target of change request {} kept changing; approval abandoned after {} attempts",
            id, MAX_APPROVAL_ATTEMPTS
        )))
    }

    /// DRAFT or PENDING -> CANCELED, by the requester only.
    pub async fn cancel(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
        comment: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        Self::ensure_requester(caller, &request)?;
        check_text("comment", comment.as_deref())?;
        self.transition(&request, ChangeRequestStatus::Canceled, caller, comment)
            .await
    }

    /// APPROVED -> IMPLEMENTED, in domains that track implementation.
    pub async fn implement(
        &self,
        caller: &Caller,
        id: ChangeRequestId,
        comment: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let request = self.requests.find_by_id(id).await?;
        if !request.domain.lifecycle().has_implementation {
            return Err(AppError::InvalidState(format!(
                "{} change requests are not marked implemented",
                request.domain
            )));
        }
        self.authorize(caller, WorkflowAction::Implement, request.domain)?;
        check_text("comment", comment.as_deref())?;
        self.transition(&request, ChangeRequestStatus::Implemented, caller, comment)
            .await
    }
}

fn check_text(field: &str, text: Option<&str>) -> Result<(), AppError> {
    match text {
        Some(text) if validate_free_text(text).is_err() => Err(AppError::validation(format!(
            "{} must be at most {} characters",
            field,
            crate::validation::rules::MAX_TEXT_LEN
        ))),
        _ => Ok(()),
    }
}

fn ensure_resolvable(request: &ChangeRequest) -> Result<(), AppError> {
    if request.status == ChangeRequestStatus::Draft {
        return Err(AppError::InvalidState(format!(
            "Change request {} is still a draft",
            request.id
        )));
    }
    if request.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Change request {} is already {}",
            request.id, request.status
        )));
    }
    Ok(())
}

fn changed_concurrently(id: ChangeRequestId) -> AppError {
    AppError::InvalidState(format!(
        "Change request {} was modified concurrently; reload and retry",
        id
    ))
}

fn log_transition(from: ChangeRequestStatus, request: &ChangeRequest, caller: &Caller) {
    tracing::info!(
        change_request_id = %request.id,
        domain = %request.domain,
        from = %from,
        to = %request.status,
        actor = %caller.user_id,
        role = %caller.role,
        "Change request transitioned"
    );
}
