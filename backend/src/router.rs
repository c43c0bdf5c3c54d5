use axum::{
    http::{HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    config::Config,
    docs::ApiDoc,
    handlers,
    middleware::{
        caller_context, log_error_responses, request_id, REQUEST_ID_HEADER, USER_ID_HEADER,
        USER_ROLE_HEADER,
    },
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no caller identity)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    // Routes that act on behalf of a caller
    let api_routes = Router::new()
        .route(
            "/api/change-requests",
            post(handlers::change_requests::submit_change_request)
                .get(handlers::change_requests::list_change_requests),
        )
        .route(
            "/api/change-requests/{id}",
            get(handlers::change_requests::get_change_request)
                .put(handlers::change_requests::update_change_request),
        )
        .route(
            "/api/change-requests/{id}/submit",
            post(handlers::change_requests::submit_draft),
        )
        .route(
            "/api/change-requests/{id}/review",
            post(handlers::change_requests::start_review),
        )
        .route(
            "/api/change-requests/{id}/resolve",
            post(handlers::change_requests::resolve_change_request),
        )
        .route(
            "/api/change-requests/{id}/cancel",
            post(handlers::change_requests::cancel_change_request),
        )
        .route(
            "/api/change-requests/{id}/implement",
            post(handlers::change_requests::implement_change_request),
        )
        .route(
            "/api/entities/{kind}",
            post(handlers::entities::create_entity),
        )
        .route(
            "/api/entities/{kind}/{id}",
            get(handlers::entities::get_entity)
                .put(handlers::entities::update_entity)
                .delete(handlers::entities::delete_entity),
        )
        .route_layer(axum_middleware::from_fn(caller_context));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(log_error_responses))
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if origins.is_empty() {
        layer.allow_origin(Any).allow_headers(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                HeaderName::from_static(USER_ID_HEADER),
                HeaderName::from_static(USER_ROLE_HEADER),
                HeaderName::from_static(REQUEST_ID_HEADER),
            ])
    }
}
