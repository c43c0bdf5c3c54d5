//! Change requests: audit-tracked proposals to mutate a target entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::models::target::TargetKind;
use crate::types::{ChangeRequestId, EntityId, UserId};

/// Proposed field values keyed by field name.
pub type FieldChanges = Map<String, Value>;

closed_enum! {
    /// Lifecycle state of a change request.
    pub enum ChangeRequestStatus {
        Draft => "DRAFT",
        Pending => "PENDING" | "SUBMITTED" | "OPEN",
        UnderReview => "UNDER_REVIEW",
        Approved => "APPROVED" | "ADJUSTED",
        Rejected => "REJECTED",
        Canceled => "CANCELED" | "CANCELLED",
        Implemented => "IMPLEMENTED",
    }
}

impl ChangeRequestStatus {
    /// Terminal states never accept another resolution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChangeRequestStatus::Approved
                | ChangeRequestStatus::Rejected
                | ChangeRequestStatus::Canceled
                | ChangeRequestStatus::Implemented
        )
    }

    /// Edge set shared by every domain. Domains may only narrow it.
    pub fn can_transition_to(&self, next: ChangeRequestStatus) -> bool {
        use ChangeRequestStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Canceled)
                | (Pending, UnderReview)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Canceled)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (Approved, Implemented)
        )
    }
}

closed_enum! {
    /// Business area a change request belongs to.
    pub enum ChangeRequestDomain {
        EmployeeProfile => "EMPLOYEE_PROFILE",
        OrgStructure => "ORG_STRUCTURE" | "ORGANIZATION",
        Performance => "PERFORMANCE",
    }
}

/// Optional lifecycle stages a domain opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLifecycle {
    /// Requests may be saved as DRAFT before submission.
    pub has_draft: bool,
    /// Approvers may move PENDING requests to UNDER_REVIEW.
    pub has_review: bool,
    /// APPROVED requests are later marked IMPLEMENTED.
    pub has_implementation: bool,
}

impl DomainLifecycle {
    pub fn permits(&self, from: ChangeRequestStatus, to: ChangeRequestStatus) -> bool {
        use ChangeRequestStatus::*;
        if !from.can_transition_to(to) {
            return false;
        }
        if from == Draft || to == Draft {
            return self.has_draft;
        }
        if from == UnderReview || to == UnderReview {
            return self.has_review;
        }
        if to == Implemented {
            return self.has_implementation;
        }
        true
    }
}

impl ChangeRequestDomain {
    pub fn lifecycle(&self) -> DomainLifecycle {
        match self {
            ChangeRequestDomain::EmployeeProfile => DomainLifecycle {
                has_draft: false,
                has_review: false,
                has_implementation: false,
            },
            ChangeRequestDomain::OrgStructure => DomainLifecycle {
                has_draft: true,
                has_review: true,
                has_implementation: true,
            },
            ChangeRequestDomain::Performance => DomainLifecycle {
                has_draft: false,
                has_review: true,
                has_implementation: false,
            },
        }
    }
}

closed_enum! {
    /// Outcome chosen by an approver.
    pub enum Decision {
        Approve => "APPROVE" | "APPROVED",
        Reject => "REJECT" | "REJECTED",
    }
}

impl Decision {
    pub fn target_status(&self) -> ChangeRequestStatus {
        match self {
            Decision::Approve => ChangeRequestStatus::Approved,
            Decision::Reject => ChangeRequestStatus::Rejected,
        }
    }
}

/// One audit entry in a change request's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    #[schema(value_type = Option<String>)]
    pub from: Option<ChangeRequestStatus>,
    #[schema(value_type = String)]
    pub to: ChangeRequestStatus,
    #[schema(value_type = String)]
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub comment: Option<String>,
}

/// Error raised when a status edge is not allowed for the request's domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move a {domain} change request from {from} to {to}")]
pub struct IllegalTransition {
    pub domain: ChangeRequestDomain,
    pub from: ChangeRequestStatus,
    pub to: ChangeRequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    #[schema(value_type = String)]
    pub id: ChangeRequestId,
    #[schema(value_type = String)]
    pub domain: ChangeRequestDomain,
    #[schema(value_type = String)]
    pub target_kind: TargetKind,
    #[schema(value_type = String)]
    pub target_entity_id: EntityId,
    #[schema(value_type = Object)]
    pub requested_changes: FieldChanges,
    #[schema(value_type = String)]
    pub status: ChangeRequestStatus,
    #[schema(value_type = String)]
    pub requested_by: UserId,
    #[schema(value_type = Option<String>)]
    pub resolved_by: Option<UserId>,
    pub reason: Option<String>,
    pub resolution_comments: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub implemented_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<StatusChange>,
}

impl ChangeRequest {
    /// Builds a freshly submitted request in `initial` (PENDING or DRAFT).
    pub fn new(
        target_kind: TargetKind,
        target_entity_id: EntityId,
        requested_changes: FieldChanges,
        requested_by: UserId,
        reason: Option<String>,
        initial: ChangeRequestStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangeRequestId::new(),
            domain: target_kind.domain(),
            target_kind,
            target_entity_id,
            requested_changes,
            status: initial,
            requested_by: requested_by.clone(),
            resolved_by: None,
            reason,
            resolution_comments: None,
            submitted_at: now,
            resolved_at: None,
            implemented_at: None,
            updated_at: now,
            history: vec![StatusChange {
                from: None,
                to: initial,
                actor: requested_by,
                at: now,
                comment: None,
            }],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_requested_by(&self, user_id: &UserId) -> bool {
        &self.requested_by == user_id
    }

    /// Returns a copy of this request moved to `next`.
    ///
    /// Entering APPROVED, REJECTED or CANCELED stamps the resolution fields.
    /// IMPLEMENTED keeps the approval's resolution and stamps `implemented_at`.
    pub fn transitioned(
        &self,
        next: ChangeRequestStatus,
        actor: &UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, IllegalTransition> {
        if !self.domain.lifecycle().permits(self.status, next) {
            return Err(IllegalTransition {
                domain: self.domain,
                from: self.status,
                to: next,
            });
        }

        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = now;
        match next {
            ChangeRequestStatus::Approved
            | ChangeRequestStatus::Rejected
            | ChangeRequestStatus::Canceled => {
                updated.resolved_by = Some(actor.clone());
                updated.resolved_at = Some(now);
                updated.resolution_comments = comment.clone();
            }
            ChangeRequestStatus::Implemented => {
                updated.implemented_at = Some(now);
            }
            _ => {}
        }
        updated.history.push(StatusChange {
            from: Some(self.status),
            to: next,
            actor: actor.clone(),
            at: now,
            comment,
        });
        Ok(updated)
    }

    /// Returns a copy with replaced proposal content. Status is untouched.
    pub fn with_changes(
        &self,
        requested_changes: FieldChanges,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut updated = self.clone();
        updated.requested_changes = requested_changes;
        updated.reason = reason;
        updated.updated_at = now;
        updated
    }
}
