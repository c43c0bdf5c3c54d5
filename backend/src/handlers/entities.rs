use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    handlers::change_requests::json_body,
    models::{
        role::Caller,
        target::{TargetKind, TargetRecord},
    },
    state::AppState,
    types::EntityId,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityPayload {
    #[schema(value_type = String, example = "E1")]
    pub id: EntityId,
    #[schema(value_type = Object)]
    pub document: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntityPayload {
    /// Version the caller last read.
    pub expected_version: i64,
    #[schema(value_type = Object)]
    pub document: Value,
}

fn parse_kind(raw: &str) -> Result<TargetKind, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Unknown entity kind: {}", raw)))
}

fn parse_entity_id(raw: &str) -> Result<EntityId, AppError> {
    EntityId::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid entity id: {}", e)))
}

pub async fn create_entity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(kind): Path<String>,
    payload: Result<Json<CreateEntityPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<TargetRecord>), AppError> {
    let kind = parse_kind(&kind)?;
    let payload = json_body(payload)?;
    let record = state
        .target_service()
        .create(&caller, kind, payload.id, &payload.document)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<TargetRecord>, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_entity_id(&id)?;
    Ok(Json(state.target_service().get(kind, &id).await?))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((kind, id)): Path<(String, String)>,
    payload: Result<Json<UpdateEntityPayload>, JsonRejection>,
) -> Result<Json<TargetRecord>, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_entity_id(&id)?;
    let payload = json_body(payload)?;
    let record = state
        .target_service()
        .update(&caller, kind, &id, payload.expected_version, &payload.document)
        .await?;
    Ok(Json(record))
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<TargetRecord>, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_entity_id(&id)?;
    Ok(Json(state.target_service().delete(&caller, kind, &id).await?))
}
