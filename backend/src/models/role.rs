//! Roles and the request-scoped caller context.

use crate::types::UserId;

closed_enum! {
    /// Roles recognised by the HR system.
    ///
    /// Legacy single-word labels from older identity providers are accepted as
    /// aliases (`EMPLOYEE`, `ADMIN`).
    pub enum SystemRole {
        DepartmentEmployee => "DEPARTMENT_EMPLOYEE" | "EMPLOYEE",
        DepartmentHead => "DEPARTMENT_HEAD",
        HrEmployee => "HR_EMPLOYEE",
        HrManager => "HR_MANAGER",
        HrAdmin => "HR_ADMIN",
        PayrollSpecialist => "PAYROLL_SPECIALIST",
        PayrollManager => "PAYROLL_MANAGER",
        FinanceStaff => "FINANCE_STAFF",
        Recruiter => "RECRUITER",
        LegalPolicyAdmin => "LEGAL_POLICY_ADMIN",
        SystemAdmin => "SYSTEM_ADMIN" | "ADMIN",
    }
}

/// Identity of whoever is invoking a workflow operation.
///
/// Built once per HTTP request by the `caller_context` middleware and passed
/// explicitly into every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: SystemRole,
}

impl Caller {
    pub fn new(user_id: UserId, role: SystemRole) -> Self {
        Self { user_id, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_display_labels() {
        assert_eq!("HR Manager".parse::<SystemRole>(), Ok(SystemRole::HrManager));
        assert_eq!(
            "department employee".parse::<SystemRole>(),
            Ok(SystemRole::DepartmentEmployee)
        );
        assert_eq!(
            "Legal & Policy Admin".parse::<SystemRole>(),
            Ok(SystemRole::LegalPolicyAdmin)
        );
        assert_eq!("system_admin".parse::<SystemRole>(), Ok(SystemRole::SystemAdmin));
    }

    #[test]
    fn role_accepts_legacy_aliases() {
        assert_eq!("Employee".parse::<SystemRole>(), Ok(SystemRole::DepartmentEmployee));
        assert_eq!("ADMIN".parse::<SystemRole>(), Ok(SystemRole::SystemAdmin));
    }

    #[test]
    fn role_rejects_unknown_values() {
        let err = "janitor".parse::<SystemRole>().unwrap_err();
        assert_eq!(err.kind, "SystemRole");
        assert_eq!(err.value, "janitor");
    }

    #[test]
    fn role_serializes_canonical_token() {
        let json = serde_json::to_string(&SystemRole::HrAdmin).unwrap();
        assert_eq!(json, "\"HR_ADMIN\"");
    }
}
