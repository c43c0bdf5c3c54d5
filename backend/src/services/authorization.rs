//! Role-based permissions for workflow actions.

use crate::models::{change_request::ChangeRequestDomain, role::SystemRole};

/// Workflow actions that require a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowAction {
    /// Create a request, or edit/cancel/submit one's own request.
    Submit,
    /// Move a pending request into review.
    Review,
    /// Approve or reject.
    Resolve,
    /// Record that an approved structural change went live.
    Implement,
    /// Create, update or delete target entities directly.
    ManageTargets,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Review => "review",
            WorkflowAction::Resolve => "resolve",
            WorkflowAction::Implement => "implement",
            WorkflowAction::ManageTargets => "manage targets",
        }
    }
}

/// Answers "does `role` permit `action` on `domain`".
pub trait AuthorizationPolicy: Send + Sync {
    fn permits(&self, role: SystemRole, action: WorkflowAction, domain: ChangeRequestDomain) -> bool;
}

/// Default role table.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolePolicy;

impl RolePolicy {
    pub fn new() -> Self {
        Self
    }

    fn allowed_roles(action: WorkflowAction, domain: ChangeRequestDomain) -> &'static [SystemRole] {
        use ChangeRequestDomain::*;
        use SystemRole::*;
        use WorkflowAction::*;

        match (action, domain) {
            (Submit, EmployeeProfile) | (Submit, Performance) => SystemRole::ALL,
            (Submit, OrgStructure) => &[DepartmentHead, HrManager, HrAdmin, SystemAdmin],

            (Review | Resolve, EmployeeProfile) => &[HrManager, HrAdmin, SystemAdmin],
            (Review | Resolve, OrgStructure) => &[SystemAdmin, HrAdmin],
            (Review | Resolve, Performance) => &[HrManager, HrAdmin],

            (Implement, OrgStructure) => &[SystemAdmin],
            (Implement, _) => &[],

            (ManageTargets, EmployeeProfile) => &[HrEmployee, HrManager, HrAdmin, SystemAdmin],
            (ManageTargets, OrgStructure) => &[SystemAdmin, HrAdmin],
            (ManageTargets, Performance) => &[HrManager, HrAdmin, HrEmployee, DepartmentHead],
        }
    }
}

impl AuthorizationPolicy for RolePolicy {
    fn permits(&self, role: SystemRole, action: WorkflowAction, domain: ChangeRequestDomain) -> bool {
        Self::allowed_roles(action, domain).contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_may_request_profile_changes() {
        let policy = RolePolicy::new();
        for &role in SystemRole::ALL {
            assert!(policy.permits(role, WorkflowAction::Submit, ChangeRequestDomain::EmployeeProfile));
        }
    }

    #[test]
    fn employees_cannot_resolve_profile_requests() {
        let policy = RolePolicy::new();
        assert!(!policy.permits(
            SystemRole::DepartmentEmployee,
            WorkflowAction::Resolve,
            ChangeRequestDomain::EmployeeProfile
        ));
        assert!(policy.permits(
            SystemRole::HrManager,
            WorkflowAction::Resolve,
            ChangeRequestDomain::EmployeeProfile
        ));
    }

    #[test]
    fn org_structure_is_owned_by_admins() {
        let policy = RolePolicy::new();
        assert!(!policy.permits(
            SystemRole::DepartmentEmployee,
            WorkflowAction::Submit,
            ChangeRequestDomain::OrgStructure
        ));
        assert!(policy.permits(
            SystemRole::DepartmentHead,
            WorkflowAction::Submit,
            ChangeRequestDomain::OrgStructure
        ));
        assert!(!policy.permits(
            SystemRole::HrManager,
            WorkflowAction::Resolve,
            ChangeRequestDomain::OrgStructure
        ));
        assert!(policy.permits(
            SystemRole::SystemAdmin,
            WorkflowAction::Implement,
            ChangeRequestDomain::OrgStructure
        ));
    }

    #[test]
    fn implement_exists_only_for_org_structure() {
        let policy = RolePolicy::new();
        for &role in SystemRole::ALL {
            assert!(!policy.permits(role, WorkflowAction::Implement, ChangeRequestDomain::EmployeeProfile));
            assert!(!policy.permits(role, WorkflowAction::Implement, ChangeRequestDomain::Performance));
        }
    }
}
