//! Employee profile records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::ValidateEmail;

use crate::models::target::{
    typed_value, optional_entity_id, optional_string, required_string, ChangeTarget, FieldError,
    TargetKind,
};
use crate::types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentStatus {
    #[default]
    Active,
    OnLeave,
    Suspended,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeProfile {
    /// Assigned by HR on hire; never changed through requests.
    pub employee_number: String,
    pub first_name: String,
    pub last_name: String,
    /// Company mailbox, provisioned by IT.
    #[serde(default)]
    pub work_email: Option<String>,
    #[serde(default)]
    pub personal_email: Option<String>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    #[serde(default)]
    pub home_phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub marital_status: Option<MaritalStatus>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub department_id: Option<EntityId>,
    #[serde(default)]
    pub position_id: Option<EntityId>,
    #[serde(default)]
    pub status: EmploymentStatus,
}

fn looks_like_phone(value: &str) -> bool {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 3
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
}

fn phone(field: &str, value: &Value) -> Result<Option<String>, FieldError> {
    let parsed = optional_string(field, value)?;
    if let Some(ref number) = parsed {
        if !looks_like_phone(number) {
            return Err(FieldError::invalid(field, "not a phone number"));
        }
    }
    Ok(parsed)
}

impl EmployeeProfile {
    fn apply_address_part(&mut self, field: &str, part: &str, value: &Value) -> Result<(), FieldError> {
        let Some(address) = self.address.as_mut() else {
            return Err(FieldError::invalid(field, "profile has no address to update"));
        };
        let parsed = optional_string(field, value)?;
        match part {
            "street" => address.street = parsed,
            "city" => address.city = parsed,
            "country" => address.country = parsed,
            _ => return Err(FieldError::NotChangeable(field.to_string())),
        }
        Ok(())
    }
}

impl ChangeTarget for EmployeeProfile {
    const KIND: TargetKind = TargetKind::EmployeeProfile;
    const CHANGEABLE_FIELDS: &'static [&'static str] = &[
        "firstName",
        "lastName",
        "personalEmail",
        "mobilePhone",
        "homePhone",
        "address",
        "address.street",
        "address.city",
        "address.country",
        "maritalStatus",
        "biography",
        "departmentId",
        "positionId",
        "status",
    ];

    fn apply_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError> {
        match field {
            "firstName" => self.first_name = required_string(field, value)?,
            "lastName" => self.last_name = required_string(field, value)?,
            "personalEmail" => {
                let email = optional_string(field, value)?;
                if !email.validate_email() {
                    return Err(FieldError::invalid(field, "not an email address"));
                }
                self.personal_email = email;
            }
            "mobilePhone" => self.mobile_phone = phone(field, value)?,
            "homePhone" => self.home_phone = phone(field, value)?,
            "address" => self.address = typed_value::<Option<Address>>(field, value)?,
            "address.street" => self.apply_address_part(field, "street", value)?,
            "address.city" => self.apply_address_part(field, "city", value)?,
            "address.country" => self.apply_address_part(field, "country", value)?,
            "maritalStatus" => {
                self.marital_status = typed_value::<Option<MaritalStatus>>(field, value)?
            }
            "biography" => {
                let bio = optional_string(field, value)?;
                if bio.as_ref().is_some_and(|b| b.chars().count() > 2000) {
                    return Err(FieldError::invalid(field, "must be at most 2000 characters"));
                }
                self.biography = bio;
            }
            "departmentId" => self.department_id = optional_entity_id(field, value)?,
            "positionId" => self.position_id = optional_entity_id(field, value)?,
            "status" => self.status = typed_value::<EmploymentStatus>(field, value)?,
            _ => return Err(FieldError::NotChangeable(field.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), FieldError> {
        if self.employee_number.trim().is_empty() {
            return Err(FieldError::invalid("employeeNumber", "must not be blank"));
        }
        if self.first_name.trim().is_empty() {
            return Err(FieldError::invalid("firstName", "must not be blank"));
        }
        if self.last_name.trim().is_empty() {
            return Err(FieldError::invalid("lastName", "must not be blank"));
        }
        for (field, email) in [
            ("workEmail", &self.work_email),
            ("personalEmail", &self.personal_email),
        ] {
            if !email.validate_email() {
                return Err(FieldError::invalid(field, "not an email address"));
            }
        }
        Ok(())
    }

    fn accepts_requests(&self) -> Result<(), FieldError> {
        if self.status == EmploymentStatus::Terminated {
            return Err(FieldError::TargetState(
                "terminated employee profiles no longer accept change requests".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::target::apply_changes;
    use serde_json::json;

    fn profile() -> EmployeeProfile {
        serde_json::from_value(json!({
            "employeeNumber": "EMP-001",
            "firstName": "Mona",
            "lastName": "Adel",
            "address": { "city": "Cairo" }
        }))
        .unwrap()
    }

    fn changes(value: Value) -> crate::models::change_request::FieldChanges {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_contact_fields() {
        let updated = apply_changes(
            &profile(),
            &changes(json!({
                "mobilePhone": "+20 100 123",
                "personalEmail": "mona@example.com",
                "maritalStatus": "MARRIED"
            })),
        )
        .unwrap();
        assert_eq!(updated.mobile_phone.as_deref(), Some("+20 100 123"));
        assert_eq!(updated.personal_email.as_deref(), Some("mona@example.com"));
        assert_eq!(updated.marital_status, Some(MaritalStatus::Married));
        assert_eq!(updated.first_name, "Mona");
    }

    #[test]
    fn rejects_malformed_phone() {
        let err = apply_changes(&profile(), &changes(json!({ "mobilePhone": "call me" })))
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidValue { ref field, .. } if field == "mobilePhone"));
    }

    #[test]
    fn rejects_malformed_personal_email() {
        for bad in ["a@b.c d", "a@@b.com", "no-at-sign"] {
            let err = apply_changes(&profile(), &changes(json!({ "personalEmail": bad })))
                .unwrap_err();
            assert!(
                matches!(err, FieldError::InvalidValue { ref field, .. } if field == "personalEmail"),
                "{} accepted",
                bad
            );
        }
        let cleared = apply_changes(&profile(), &changes(json!({ "personalEmail": null }))).unwrap();
        assert!(cleared.personal_email.is_none());
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = apply_changes(&profile(), &changes(json!({ "firstName": "  " }))).unwrap_err();
        assert!(matches!(err, FieldError::InvalidValue { ref field, .. } if field == "firstName"));
    }

    #[test]
    fn address_part_requires_existing_address() {
        let updated = apply_changes(&profile(), &changes(json!({ "address.city": "Giza" }))).unwrap();
        assert_eq!(updated.address.unwrap().city.as_deref(), Some("Giza"));

        let mut without = profile();
        without.address = None;
        let err = apply_changes(&without, &changes(json!({ "address.city": "Giza" }))).unwrap_err();
        assert!(matches!(err, FieldError::InvalidValue { ref field, .. } if field == "address.city"));
    }

    #[test]
    fn work_email_is_not_requestable() {
        let err = apply_changes(&profile(), &changes(json!({ "workEmail": "x@corp.com" })))
            .unwrap_err();
        assert_eq!(err, FieldError::NotChangeable("workEmail".into()));
    }

    #[test]
    fn terminated_profiles_refuse_requests() {
        let mut terminated = profile();
        terminated.status = EmploymentStatus::Terminated;
        assert!(terminated.accepts_requests().is_err());
        assert!(profile().accepts_requests().is_ok());
    }
}
