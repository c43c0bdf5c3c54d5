use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        change_request::{ChangeRequest, Decision, FieldChanges},
        role::Caller,
        target::TargetKind,
        PaginationQuery,
    },
    repositories::ChangeRequestFilters,
    services::NewChangeRequest,
    state::AppState,
    types::{ChangeRequestId, EntityId, UserId},
    validation::rules::validate_requested_changes,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitChangeRequestPayload {
    #[schema(value_type = String, example = "EMPLOYEE_PROFILE")]
    pub target_kind: TargetKind,
    #[schema(value_type = String, example = "E1")]
    pub target_entity_id: EntityId,
    #[validate(custom(function = "validate_requested_changes"))]
    #[schema(value_type = Object)]
    pub requested_changes: FieldChanges,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    /// Save as DRAFT (org structure only).
    #[serde(default)]
    pub as_draft: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChangeRequestPayload {
    #[validate(custom(function = "validate_requested_changes"))]
    #[schema(value_type = Object)]
    pub requested_changes: FieldChanges,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveChangeRequestPayload {
    #[schema(value_type = String, example = "APPROVE")]
    pub decision: Decision,
    #[validate(length(max = 500))]
    pub resolution_comments: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ChangeRequestListQuery {
    pub status: Option<String>,
    pub domain: Option<String>,
    pub target_kind: Option<String>,
    pub target_entity_id: Option<String>,
    pub requested_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ChangeRequestListQuery {
    fn into_parts(self) -> Result<(ChangeRequestFilters, PaginationQuery), AppError> {
        let filters = ChangeRequestFilters {
            status: parse_filter("status", self.status.as_deref())?,
            domain: parse_filter("domain", self.domain.as_deref())?,
            target_kind: parse_filter("targetKind", self.target_kind.as_deref())?,
            target_entity_id: parse_filter::<EntityId>("targetEntityId", self.target_entity_id.as_deref())?,
            requested_by: parse_filter::<UserId>("requestedBy", self.requested_by.as_deref())?,
            visible_to: None,
        };
        let defaults = PaginationQuery::default();
        let page = PaginationQuery {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        };
        Ok((filters, page))
    }
}

fn parse_filter<T>(name: &str, raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| AppError::validation(format!("{}: {}", name, e))),
        None => Ok(None),
    }
}

pub(crate) fn parse_change_request_id(raw: &str) -> Result<ChangeRequestId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid change request id: {}", raw)))
}

/// Unwraps a JSON body, turning extractor rejections into our error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Parses an optional JSON body; an empty body yields `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

pub async fn submit_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<SubmitChangeRequestPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ChangeRequest>), AppError> {
    let payload = json_body(payload)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .submit(
            &caller,
            NewChangeRequest {
                target_kind: payload.target_kind,
                target_entity_id: payload.target_entity_id,
                requested_changes: payload.requested_changes,
                reason: payload.reason,
                as_draft: payload.as_draft,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_change_requests(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ChangeRequestListQuery>,
) -> Result<Json<Vec<ChangeRequest>>, AppError> {
    let (filters, page) = query.into_parts()?;
    let requests = state
        .change_request_service()
        .list(&caller, filters, &page)
        .await?;
    Ok(Json(requests))
}

pub async fn get_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let request = state.change_request_service().get(&caller, id).await?;
    Ok(Json(request))
}

pub async fn update_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateChangeRequestPayload>, JsonRejection>,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let payload = json_body(payload)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .update(&caller, id, payload.requested_changes, payload.reason)
        .await?;
    Ok(Json(request))
}

pub async fn submit_draft(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let request = state.change_request_service().submit_draft(&caller, id).await?;
    Ok(Json(request))
}

pub async fn start_review(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let payload: CommentPayload = optional_body(&body)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .start_review(&caller, id, payload.comment)
        .await?;
    Ok(Json(request))
}

pub async fn resolve_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<ResolveChangeRequestPayload>, JsonRejection>,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let payload = json_body(payload)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .resolve(&caller, id, payload.decision, payload.resolution_comments)
        .await?;
    Ok(Json(request))
}

pub async fn cancel_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let payload: CommentPayload = optional_body(&body)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .cancel(&caller, id, payload.comment)
        .await?;
    Ok(Json(request))
}

pub async fn implement_change_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChangeRequest>, AppError> {
    let id = parse_change_request_id(&id)?;
    let payload: CommentPayload = optional_body(&body)?;
    payload.validate()?;

    let request = state
        .change_request_service()
        .implement(&caller, id, payload.comment)
        .await?;
    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::change_request::{ChangeRequestDomain, ChangeRequestStatus};

    #[test]
    fn list_query_parses_filters_and_clamps_page() {
        let query = ChangeRequestListQuery {
            status: Some("pending".into()),
            domain: Some("Org Structure".into()),
            requested_by: Some("U1".into()),
            limit: Some(10_000),
            ..Default::default()
        };
        let (filters, page) = query.into_parts().unwrap();
        assert_eq!(filters.status, Some(ChangeRequestStatus::Pending));
        assert_eq!(filters.domain, Some(ChangeRequestDomain::OrgStructure));
        assert_eq!(filters.requested_by, Some(UserId::parse("U1").unwrap()));
        assert_eq!(page.limit(), 500);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn unknown_status_filter_is_a_validation_error() {
        let query = ChangeRequestListQuery {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert!(matches!(query.into_parts(), Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_body_means_no_comment() {
        let payload: CommentPayload = optional_body(&Bytes::new()).unwrap();
        assert!(payload.comment.is_none());

        let payload: CommentPayload = optional_body(&Bytes::from_static(br#"{"comment":"ok"}"#)).unwrap();
        assert_eq!(payload.comment.as_deref(), Some("ok"));
    }

    #[test]
    fn submit_payload_rejects_empty_changes() {
        let payload: SubmitChangeRequestPayload = serde_json::from_value(serde_json::json!({
            "targetKind": "EMPLOYEE_PROFILE",
            "targetEntityId": "E1",
            "requestedChanges": {}
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }
}
