use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_LENGTH, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;

/// Logs every 4xx/5xx response with the error `code` from its JSON body.
/// The body is buffered and forwarded unchanged.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(
                status = status.as_u16(),
                method = %method,
                uri = %uri,
                latency_ms,
                error = ?err,
                "Failed to read error response body"
            );
            parts.headers.remove(CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let code = error_code(&bytes);
    let message = error_message(&bytes);
    if status.is_server_error() {
        tracing::error!(
            status = status.as_u16(),
            method = %method,
            uri = %uri,
            latency_ms,
            code = %code,
            detail = %message,
            "Request failed"
        );
    } else {
        tracing::warn!(
            status = status.as_u16(),
            method = %method,
            uri = %uri,
            latency_ms,
            code = %code,
            detail = %message,
            "Request rejected"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn body_field(bytes: &Bytes, field: &str) -> String {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|json| json.get(field).and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_default()
}

fn error_code(bytes: &Bytes) -> String {
    body_field(bytes, "code")
}

fn error_message(bytes: &Bytes) -> String {
    body_field(bytes, "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_read_from_error_body() {
        let body = Bytes::from_static(br#"{"error":"nope","code":"INVALID_STATE"}"#);
        assert_eq!(error_code(&body), "INVALID_STATE");
        assert_eq!(error_message(&body), "nope");
    }

    #[test]
    fn non_json_body_has_no_code() {
        assert_eq!(error_code(&Bytes::from_static(b"plain text")), "");
    }
}
