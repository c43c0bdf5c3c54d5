#![allow(dead_code)]
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use hrdesk_backend::{
    config::{Config, StorageBackend},
    repositories::InMemoryStore,
    router::build_router,
    state::AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const EMPLOYEE: (&str, &str) = ("U1", "DEPARTMENT_EMPLOYEE");
pub const HR_MANAGER: (&str, &str) = ("HR1", "HR_MANAGER");
pub const HR_ADMIN: (&str, &str) = ("HRA1", "HR_ADMIN");
pub const SYSTEM_ADMIN: (&str, &str) = ("SA1", "SYSTEM_ADMIN");
pub const DEPARTMENT_HEAD: (&str, &str) = ("DH1", "DEPARTMENT_HEAD");
pub const PAYROLL: (&str, &str) = ("PS1", "PAYROLL_SPECIALIST");

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
}

pub fn test_config() -> Config {
    Config {
        storage_backend: StorageBackend::Memory,
        ..Config::default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let router = build_router(AppState::with_store(test_config(), store.clone()));
        Self { router, store }
    }

    /// App with E1, D1, P1 and an HR-published appraisal A1 already stored.
    pub async fn seeded() -> Self {
        let app = Self::new();
        app.seed("employee-profiles", "E1", profile_document()).await;
        app.seed("departments", "D1", json!({ "code": "FIN", "name": "Finance" }))
            .await;
        app.seed(
            "positions",
            "P1",
            json!({ "code": "FIN-ANALYST", "title": "Financial Analyst", "departmentId": "D1" }),
        )
        .await;
        app.seed(
            "appraisal-records",
            "A1",
            json!({
                "employeeId": "E1",
                "cycleId": "2025-H1",
                "totalScore": 62.5,
                "overallRatingLabel": "Meets",
                "status": "HR_PUBLISHED"
            }),
        )
        .await;
        app
    }

    pub async fn seed(&self, kind: &str, id: &str, document: Value) {
        let (status, body) = self
            .send(
                Method::POST,
                &format!("/api/entities/{}", kind),
                Some(HR_ADMIN),
                Some(json!({ "id": id, "document": document })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "seeding {} {}: {}", kind, id, body);
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(build_request(method, uri, caller, body))
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn entity(&self, kind: &str, id: &str) -> (StatusCode, Value) {
        self.send(
            Method::GET,
            &format!("/api/entities/{}/{}", kind, id),
            Some(EMPLOYEE),
            None,
        )
        .await
    }

    pub async fn submit(&self, caller: (&str, &str), payload: Value) -> (StatusCode, Value) {
        self.send(Method::POST, "/api/change-requests", Some(caller), Some(payload))
            .await
    }

    pub async fn resolve(&self, caller: (&str, &str), id: &str, decision: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/change-requests/{}/resolve", id),
            Some(caller),
            Some(json!({ "decision": decision })),
        )
        .await
    }

    pub async fn action(&self, caller: (&str, &str), id: &str, action: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/change-requests/{}/{}", id, action),
            Some(caller),
            None,
        )
        .await
    }
}

pub fn build_request(
    method: Method,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = caller {
        builder = builder.header("x-user-id", user_id).header("x-user-role", role);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn profile_document() -> Value {
    json!({
        "employeeNumber": "EMP-0001",
        "firstName": "Mona",
        "lastName": "Adel",
        "mobilePhone": "+20100000",
        "status": "ACTIVE"
    })
}

pub fn id_of(body: &Value) -> String {
    body["id"].as_str().unwrap().to_string()
}
