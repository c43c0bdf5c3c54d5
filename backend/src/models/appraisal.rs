//! Performance appraisal records. Employees dispute published results through
//! change requests in the PERFORMANCE domain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::target::{optional_string, required_string, ChangeTarget, FieldError, TargetKind};
use crate::types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppraisalStatus {
    #[default]
    Draft,
    ManagerSubmitted,
    HrPublished,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppraisalRecord {
    pub employee_id: EntityId,
    pub cycle_id: EntityId,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub overall_rating_label: Option<String>,
    #[serde(default)]
    pub manager_summary: Option<String>,
    #[serde(default)]
    pub status: AppraisalStatus,
}

const MAX_SCORE: f64 = 100.0;

impl ChangeTarget for AppraisalRecord {
    const KIND: TargetKind = TargetKind::AppraisalRecord;
    const CHANGEABLE_FIELDS: &'static [&'static str] =
        &["totalScore", "overallRatingLabel", "managerSummary"];

    fn apply_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError> {
        match field {
            "totalScore" => {
                let score = value
                    .as_f64()
                    .ok_or_else(|| FieldError::invalid(field, "expected a number"))?;
                self.total_score = Some(score);
            }
            "overallRatingLabel" => self.overall_rating_label = Some(required_string(field, value)?),
            "managerSummary" => self.manager_summary = optional_string(field, value)?,
            _ => return Err(FieldError::NotChangeable(field.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), FieldError> {
        if let Some(score) = self.total_score {
            if !(0.0..=MAX_SCORE).contains(&score) {
                return Err(FieldError::invalid("totalScore", "must be between 0 and 100"));
            }
        }
        Ok(())
    }

    fn accepts_requests(&self) -> Result<(), FieldError> {
        if self.status != AppraisalStatus::HrPublished {
            return Err(FieldError::TargetState(
                "only HR-published appraisals can be disputed".into(),
            ));
        }
        Ok(())
    }
}
