//! Target entities and the allow-listed field appliers used on approval.
//!
//! Every entity a change request may mutate implements [`ChangeTarget`]. The
//! workflow never merges arbitrary JSON onto a stored document: each requested
//! field goes through the entity's own `apply_field`, and the whole set is
//! applied to a copy so that a failure on any field leaves the original
//! untouched.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::models::{
    appraisal::AppraisalRecord,
    change_request::{ChangeRequestDomain, FieldChanges},
    employee_profile::EmployeeProfile,
    organization::{Department, Position},
};
use crate::types::EntityId;

closed_enum! {
    /// Kind of record a change request targets.
    pub enum TargetKind {
        EmployeeProfile => "EMPLOYEE_PROFILE" | "EMPLOYEE_PROFILES",
        Department => "DEPARTMENT" | "DEPARTMENTS",
        Position => "POSITION" | "POSITIONS",
        AppraisalRecord => "APPRAISAL_RECORD" | "APPRAISAL_RECORDS" | "APPRAISAL",
    }
}

impl TargetKind {
    pub fn domain(&self) -> ChangeRequestDomain {
        match self {
            TargetKind::EmployeeProfile => ChangeRequestDomain::EmployeeProfile,
            TargetKind::Department | TargetKind::Position => ChangeRequestDomain::OrgStructure,
            TargetKind::AppraisalRecord => ChangeRequestDomain::Performance,
        }
    }

    /// Fields a change request may touch for this kind.
    pub fn changeable_fields(&self) -> &'static [&'static str] {
        match self {
            TargetKind::EmployeeProfile => EmployeeProfile::CHANGEABLE_FIELDS,
            TargetKind::Department => Department::CHANGEABLE_FIELDS,
            TargetKind::Position => Position::CHANGEABLE_FIELDS,
            TargetKind::AppraisalRecord => AppraisalRecord::CHANGEABLE_FIELDS,
        }
    }
}

/// Why a proposed change cannot be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("field `{0}` cannot be changed through a change request")]
    NotChangeable(String),
    #[error("field `{field}`: {message}")]
    InvalidValue { field: String, message: String },
    #[error("{0}")]
    TargetState(String),
    #[error("invalid {kind} document: {message}")]
    Document { kind: TargetKind, message: String },
}

impl FieldError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        FieldError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// An entity that can be mutated through approved change requests.
pub trait ChangeTarget: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: TargetKind;
    const CHANGEABLE_FIELDS: &'static [&'static str];

    /// Applies a single allow-listed field. `field` is already known to be in
    /// `CHANGEABLE_FIELDS`.
    fn apply_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError>;

    /// Whole-entity invariants, checked on creation and after every patch.
    fn validate(&self) -> Result<(), FieldError> {
        Ok(())
    }

    /// Whether new change requests may currently target this entity.
    fn accepts_requests(&self) -> Result<(), FieldError> {
        Ok(())
    }
}

/// Applies every change to a copy of `entity`. All fields or none.
pub fn apply_changes<T: ChangeTarget>(entity: &T, changes: &FieldChanges) -> Result<T, FieldError> {
    let mut next = entity.clone();
    for (field, value) in changes {
        if !T::CHANGEABLE_FIELDS.contains(&field.as_str()) {
            return Err(FieldError::NotChangeable(field.clone()));
        }
        next.apply_field(field, value)?;
    }
    next.validate()?;
    Ok(next)
}

fn decode<T: ChangeTarget>(document: &Value) -> Result<T, FieldError> {
    serde_json::from_value(document.clone()).map_err(|e| FieldError::Document {
        kind: T::KIND,
        message: e.to_string(),
    })
}

fn encode<T: ChangeTarget>(entity: &T) -> Result<Value, FieldError> {
    serde_json::to_value(entity).map_err(|e| FieldError::Document {
        kind: T::KIND,
        message: e.to_string(),
    })
}

fn patch_document<T: ChangeTarget>(document: &Value, changes: &FieldChanges) -> Result<Value, FieldError> {
    let entity: T = decode(document)?;
    encode(&apply_changes(&entity, changes)?)
}

fn normalize_document<T: ChangeTarget>(document: &Value) -> Result<Value, FieldError> {
    let entity: T = decode(document)?;
    entity.validate()?;
    encode(&entity)
}

fn check_accepts<T: ChangeTarget>(document: &Value) -> Result<(), FieldError> {
    decode::<T>(document)?.accepts_requests()
}

/// Applies `changes` to a stored document of `kind`, returning the new document.
pub fn apply_to_document(
    kind: TargetKind,
    document: &Value,
    changes: &FieldChanges,
) -> Result<Value, FieldError> {
    match kind {
        TargetKind::EmployeeProfile => patch_document::<EmployeeProfile>(document, changes),
        TargetKind::Department => patch_document::<Department>(document, changes),
        TargetKind::Position => patch_document::<Position>(document, changes),
        TargetKind::AppraisalRecord => patch_document::<AppraisalRecord>(document, changes),
    }
}

/// Rewrites each requested value into the form the entity stores it in
/// (trimmed strings, blank as null, numbers as the field's numeric type), so
/// that an approved proposal and the resulting document agree field by field.
pub fn canonical_changes(
    kind: TargetKind,
    document: &Value,
    changes: &FieldChanges,
) -> Result<FieldChanges, FieldError> {
    let patched = apply_to_document(kind, document, changes)?;
    Ok(changes
        .keys()
        .map(|field| {
            let stored = field
                .split('.')
                .try_fold(&patched, |node, part| node.get(part))
                .cloned()
                .unwrap_or(Value::Null);
            (field.clone(), stored)
        })
        .collect())
}

/// Parses an inbound document into its typed entity, validates it and returns
/// the canonical serialized form.
pub fn validate_document(kind: TargetKind, document: &Value) -> Result<Value, FieldError> {
    match kind {
        TargetKind::EmployeeProfile => normalize_document::<EmployeeProfile>(document),
        TargetKind::Department => normalize_document::<Department>(document),
        TargetKind::Position => normalize_document::<Position>(document),
        TargetKind::AppraisalRecord => normalize_document::<AppraisalRecord>(document),
    }
}

pub fn ensure_accepts_requests(kind: TargetKind, document: &Value) -> Result<(), FieldError> {
    match kind {
        TargetKind::EmployeeProfile => check_accepts::<EmployeeProfile>(document),
        TargetKind::Department => check_accepts::<Department>(document),
        TargetKind::Position => check_accepts::<Position>(document),
        TargetKind::AppraisalRecord => check_accepts::<AppraisalRecord>(document),
    }
}

/// A stored target entity together with its concurrency metadata.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    #[schema(value_type = String)]
    pub kind: TargetKind,
    #[schema(value_type = String)]
    pub id: EntityId,
    #[schema(value_type = Object)]
    pub document: Value,
    /// Incremented on every write; writers must present the version they read.
    pub version: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRecord {
    pub fn new(kind: TargetKind, id: EntityId, document: Value, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            id,
            document,
            version: 1,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// Field value helpers shared by the entity appliers.

pub(crate) fn required_string(field: &str, value: &Value) -> Result<String, FieldError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(FieldError::invalid(field, "must not be blank")),
        _ => Err(FieldError::invalid(field, "expected a string")),
    }
}

pub(crate) fn optional_string(field: &str, value: &Value) -> Result<Option<String>, FieldError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        _ => Err(FieldError::invalid(field, "expected a string or null")),
    }
}

pub(crate) fn optional_entity_id(field: &str, value: &Value) -> Result<Option<EntityId>, FieldError> {
    match optional_string(field, value)? {
        Some(raw) => EntityId::parse(&raw)
            .map(Some)
            .map_err(|e| FieldError::invalid(field, e.to_string())),
        None => Ok(None),
    }
}

pub(crate) fn required_bool(field: &str, value: &Value) -> Result<bool, FieldError> {
    value
        .as_bool()
        .ok_or_else(|| FieldError::invalid(field, "expected a boolean"))
}

pub(crate) fn typed_value<T: DeserializeOwned>(field: &str, value: &Value) -> Result<T, FieldError> {
    serde_json::from_value(value.clone()).map_err(|e| FieldError::invalid(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(value: Value) -> FieldChanges {
        value.as_object().cloned().unwrap()
    }

    fn profile_doc() -> Value {
        json!({
            "employeeNumber": "EMP-001",
            "firstName": "Mona",
            "lastName": "Adel",
            "mobilePhone": "+20100",
            "address": { "street": "1 Nile St", "city": "Cairo", "country": "EG" }
        })
    }

    #[test]
    fn kinds_map_to_domains() {
        assert_eq!(TargetKind::EmployeeProfile.domain(), ChangeRequestDomain::EmployeeProfile);
        assert_eq!(TargetKind::Department.domain(), ChangeRequestDomain::OrgStructure);
        assert_eq!(TargetKind::Position.domain(), ChangeRequestDomain::OrgStructure);
        assert_eq!(TargetKind::AppraisalRecord.domain(), ChangeRequestDomain::Performance);
    }

    #[test]
    fn kind_parses_path_segments() {
        assert_eq!("employee-profiles".parse::<TargetKind>(), Ok(TargetKind::EmployeeProfile));
        assert_eq!("appraisal-records".parse::<TargetKind>(), Ok(TargetKind::AppraisalRecord));
    }

    #[test]
    fn apply_to_document_changes_only_named_fields() {
        let before = profile_doc();
        let after = apply_to_document(
            TargetKind::EmployeeProfile,
            &before,
            &changes(json!({ "mobilePhone": "+201234" })),
        )
        .unwrap();

        assert_eq!(after["mobilePhone"], "+201234");
        let mut expected = validate_document(TargetKind::EmployeeProfile, &before).unwrap();
        expected["mobilePhone"] = json!("+201234");
        assert_eq!(after, expected);
    }

    #[test]
    fn canonical_changes_match_the_patched_document() {
        let proposal = changes(json!({
            "mobilePhone": " +201234 ",
            "biography": "",
            "address.city": "Giza"
        }));
        let canonical =
            canonical_changes(TargetKind::EmployeeProfile, &profile_doc(), &proposal).unwrap();
        assert_eq!(canonical["mobilePhone"], "+201234");
        assert_eq!(canonical["biography"], Value::Null);
        assert_eq!(canonical["address.city"], "Giza");

        let after = apply_to_document(TargetKind::EmployeeProfile, &profile_doc(), &canonical).unwrap();
        assert_eq!(after["mobilePhone"], canonical["mobilePhone"]);
        assert_eq!(after["address"]["city"], canonical["address.city"]);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let before = profile_doc();
        let err = apply_to_document(
            TargetKind::EmployeeProfile,
            &before,
            &changes(json!({ "mobilePhone": "+201234", "employeeNumber": "EMP-999" })),
        )
        .unwrap_err();
        assert_eq!(err, FieldError::NotChangeable("employeeNumber".into()));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = apply_to_document(
            TargetKind::Department,
            &json!({ "code": "FIN", "name": "Finance" }),
            &changes(json!({ "budget": 10 })),
        )
        .unwrap_err();
        assert_eq!(err, FieldError::NotChangeable("budget".into()));
    }

    #[test]
    fn validate_document_rejects_wrong_shape() {
        let err = validate_document(TargetKind::Position, &json!({ "title": 3 })).unwrap_err();
        assert!(matches!(err, FieldError::Document { kind: TargetKind::Position, .. }));
    }

    #[test]
    fn target_record_starts_at_version_one() {
        let record = TargetRecord::new(
            TargetKind::Department,
            EntityId::parse("D1").unwrap(),
            json!({}),
            Utc::now(),
        );
        assert_eq!(record.version, 1);
        assert!(!record.deleted);
    }
}
