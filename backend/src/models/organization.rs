//! Organizational structure: departments and positions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::target::{
    optional_entity_id, optional_string, required_bool, required_string, ChangeTarget, FieldError,
    TargetKind,
};
use crate::types::EntityId;

fn validate_code(code: &str) -> Result<(), FieldError> {
    if code.is_empty() || code.len() > 32 {
        return Err(FieldError::invalid("code", "must be 1-32 characters"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(FieldError::invalid(
            "code",
            "only uppercase letters, digits, '-' and '_' are allowed",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub head_position_id: Option<EntityId>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ChangeTarget for Department {
    const KIND: TargetKind = TargetKind::Department;
    const CHANGEABLE_FIELDS: &'static [&'static str] =
        &["name", "description", "headPositionId", "isActive"];

    fn apply_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError> {
        match field {
            "name" => self.name = required_string(field, value)?,
            "description" => self.description = optional_string(field, value)?,
            "headPositionId" => self.head_position_id = optional_entity_id(field, value)?,
            "isActive" => self.is_active = required_bool(field, value)?,
            _ => return Err(FieldError::NotChangeable(field.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), FieldError> {
        validate_code(&self.code)?;
        if self.name.trim().is_empty() {
            return Err(FieldError::invalid("name", "must not be blank"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub department_id: EntityId,
    #[serde(default)]
    pub reports_to_position_id: Option<EntityId>,
    #[serde(default)]
    pub pay_grade: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ChangeTarget for Position {
    const KIND: TargetKind = TargetKind::Position;
    const CHANGEABLE_FIELDS: &'static [&'static str] = &[
        "title",
        "description",
        "departmentId",
        "reportsToPositionId",
        "payGrade",
        "isActive",
    ];

    fn apply_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError> {
        match field {
            "title" => self.title = required_string(field, value)?,
            "description" => self.description = optional_string(field, value)?,
            "departmentId" => {
                self.department_id = optional_entity_id(field, value)?
                    .ok_or_else(|| FieldError::invalid(field, "a position must belong to a department"))?
            }
            "reportsToPositionId" => self.reports_to_position_id = optional_entity_id(field, value)?,
            "payGrade" => self.pay_grade = optional_string(field, value)?,
            "isActive" => self.is_active = required_bool(field, value)?,
            _ => return Err(FieldError::NotChangeable(field.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), FieldError> {
        validate_code(&self.code)?;
        if self.title.trim().is_empty() {
            return Err(FieldError::invalid("title", "must not be blank"));
        }
        Ok(())
    }
}
