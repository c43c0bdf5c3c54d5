#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        change_requests::{
            ChangeRequestListQuery, CommentPayload, ResolveChangeRequestPayload,
            SubmitChangeRequestPayload, UpdateChangeRequestPayload,
        },
        entities::{CreateEntityPayload, UpdateEntityPayload},
        health::HealthResponse,
    },
    middleware::{USER_ID_HEADER, USER_ROLE_HEADER},
    models::{
        change_request::{ChangeRequest, StatusChange},
        target::TargetRecord,
    },
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_doc,
        list_doc,
        get_doc,
        update_doc,
        submit_draft_doc,
        review_doc,
        resolve_doc,
        cancel_doc,
        implement_doc,
        create_entity_doc,
        get_entity_doc,
        update_entity_doc,
        delete_entity_doc,
        health_doc
    ),
    components(
        schemas(
            // change requests
            ChangeRequest,
            StatusChange,
            SubmitChangeRequestPayload,
            UpdateChangeRequestPayload,
            ResolveChangeRequestPayload,
            CommentPayload,
            ChangeRequestListQuery,
            // targets
            TargetRecord,
            CreateEntityPayload,
            UpdateEntityPayload,
            // misc
            ErrorResponse,
            HealthResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "ChangeRequests", description = "Submit, review and resolve change requests"),
        (name = "Entities", description = "Direct maintenance of target entities"),
        (name = "System", description = "Liveness")
    ),
    security(("UserId" = [], "UserRole" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "UserId",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
        );
        components.add_security_scheme(
            "UserRole",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ROLE_HEADER))),
        );
    }
}

#[utoipa::path(
    post,
    path = "/api/change-requests",
    request_body = SubmitChangeRequestPayload,
    responses(
        (status = 201, description = "Request created in PENDING or DRAFT", body = ChangeRequest),
        (status = 400, description = "Invalid proposal", body = ErrorResponse),
        (status = 403, description = "Role may not submit in this domain", body = ErrorResponse)
    ),
    tag = "ChangeRequests"
)]
fn submit_doc() {}

#[utoipa::path(
    get,
    path = "/api/change-requests",
    params(ChangeRequestListQuery),
    responses((status = 200, description = "Oldest submission first", body = [ChangeRequest])),
    tag = "ChangeRequests"
)]
fn list_doc() {}

#[utoipa::path(
    get,
    path = "/api/change-requests/{id}",
    params(("id" = String, Path, description = "Change request ID")),
    responses(
        (status = 200, body = ChangeRequest),
        (status = 404, body = ErrorResponse)
    ),
    tag = "ChangeRequests"
)]
fn get_doc() {}

#[utoipa::path(
    put,
    path = "/api/change-requests/{id}",
    params(("id" = String, Path, description = "Change request ID")),
    request_body = UpdateChangeRequestPayload,
    responses(
        (status = 200, body = ChangeRequest),
        (status = 409, description = "No longer editable", body = ErrorResponse)
    ),
    tag = "ChangeRequests"
)]
fn update_doc() {}

#[utoipa::path(
    post,
    path = "/api/change-requests/{id}/submit",
    params(("id" = String, Path, description = "Change request ID")),
    responses((status = 200, description = "DRAFT moved to PENDING", body = ChangeRequest)),
    tag = "ChangeRequests"
)]
fn submit_draft_doc() {}

#[utoipa::path(
    post,
    path = "/api/change-requests/{id}/review",
    params(("id" = String, Path, description = "Change request ID")),
    request_body(content = CommentPayload, description = "Optional; an empty body is accepted"),
    responses((status = 200, description = "PENDING moved to UNDER_REVIEW", body = ChangeRequest)),
    tag = "ChangeRequests"
)]
fn review_doc() {}

#[utoipa::path(
    post,
    path = "/api/change-requests/{id}/resolve",
    params(("id" = String, Path, description = "Change request ID")),
    request_body = ResolveChangeRequestPayload,
    responses(
        (status = 200, body = ChangeRequest),
        (status = 403, body = ErrorResponse),
        (status = 409, description = "Already resolved or target kept changing", body = ErrorResponse)
    ),
    tag = "ChangeRequests"
)]
fn resolve_doc() {}

#[utoipa::path(
    post,
    path = "/api/change-requests/{id}/cancel",
    params(("id" = String, Path, description = "Change request ID")),
    request_body(content = CommentPayload, description = "Optional; an empty body is accepted"),
    responses((status = 200, body = ChangeRequest)),
    tag = "ChangeRequests"
)]
fn cancel_doc() {}

#[utoipa::path(
    post,
    path = "/api/change-requests/{id}/implement",
    params(("id" = String, Path, description = "Change request ID")),
    request_body(content = CommentPayload, description = "Optional; an empty body is accepted"),
    responses((status = 200, description = "APPROVED moved to IMPLEMENTED", body = ChangeRequest)),
    tag = "ChangeRequests"
)]
fn implement_doc() {}

#[utoipa::path(
    post,
    path = "/api/entities/{kind}",
    params(("kind" = String, Path, description = "employee-profiles, departments, positions or appraisal-records")),
    request_body = CreateEntityPayload,
    responses((status = 201, body = TargetRecord)),
    tag = "Entities"
)]
fn create_entity_doc() {}

#[utoipa::path(
    get,
    path = "/api/entities/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity ID")
    ),
    responses((status = 200, body = TargetRecord), (status = 404, body = ErrorResponse)),
    tag = "Entities"
)]
fn get_entity_doc() {}

#[utoipa::path(
    put,
    path = "/api/entities/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity ID")
    ),
    request_body = UpdateEntityPayload,
    responses(
        (status = 200, body = TargetRecord),
        (status = 409, description = "expectedVersion is stale", body = ErrorResponse)
    ),
    tag = "Entities"
)]
fn update_entity_doc() {}

#[utoipa::path(
    delete,
    path = "/api/entities/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity ID")
    ),
    responses((status = 200, description = "Soft-deleted record", body = TargetRecord)),
    tag = "Entities"
)]
fn delete_entity_doc() {}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "System",
    security(())
)]
fn health_doc() {}
