//! Common validation rules shared across request payloads.

use validator::ValidationError;

use crate::models::change_request::FieldChanges;

/// Upper bound for `reason`, `comment` and `resolutionComments`.
pub const MAX_TEXT_LEN: usize = 500;

/// A change request must propose at least one field.
pub fn validate_requested_changes(changes: &FieldChanges) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::new("requested_changes_empty"));
    }
    if changes.keys().any(|field| field.trim().is_empty()) {
        return Err(ValidationError::new("requested_changes_blank_field"));
    }
    Ok(())
}

/// Free-text annotations are optional but bounded.
pub fn validate_free_text(text: &str) -> Result<(), ValidationError> {
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::new("text_too_long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requested_changes_rejects_empty() {
        assert!(validate_requested_changes(&FieldChanges::new()).is_err());
    }

    #[test]
    fn requested_changes_rejects_blank_field_name() {
        let mut changes = FieldChanges::new();
        changes.insert(" ".into(), json!("x"));
        assert!(validate_requested_changes(&changes).is_err());
    }

    #[test]
    fn requested_changes_accepts_one_field() {
        let mut changes = FieldChanges::new();
        changes.insert("mobilePhone".into(), json!("+201234"));
        assert!(validate_requested_changes(&changes).is_ok());
    }

    #[test]
    fn free_text_is_bounded() {
        assert!(validate_free_text(&"a".repeat(MAX_TEXT_LEN)).is_ok());
        assert!(validate_free_text(&"a".repeat(MAX_TEXT_LEN + 1)).is_err());
    }
}
