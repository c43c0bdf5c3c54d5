use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::{
    error::AppError,
    models::role::{Caller, SystemRole},
    types::UserId,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Builds the [`Caller`] from headers set by the authenticating gateway and
/// stores it as a request extension.
pub async fn caller_context(mut request: Request, next: Next) -> Result<Response, AppError> {
    let caller = caller_from_headers(request.headers())?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let (Some(raw_user), Some(raw_role)) = (
        header_str(headers, USER_ID_HEADER),
        header_str(headers, USER_ROLE_HEADER),
    ) else {
        return Err(AppError::Unauthorized(format!(
            "Missing {} or {} header",
            USER_ID_HEADER, USER_ROLE_HEADER
        )));
    };

    let user_id = UserId::parse(raw_user)
        .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", USER_ID_HEADER, e)))?;
    let role: SystemRole = raw_role
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", USER_ROLE_HEADER, e)))?;

    Ok(Caller::new(user_id, role))
}
