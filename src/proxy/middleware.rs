//! Middleware implementations for the proxy service

use crate::error::Error;
use crate::infrastructure::log_messages::admin;
use crate::proxy::error_response::attach_request_id;
use crate::proxy::headers::{paths, X_API_KEY, X_REQUEST_ID};
use axum::{
    extract::{Query, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use nutype::nutype;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared secret guarding the admin API
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Clone, PartialEq, Eq, Hash, AsRef, TryFrom)
)]
pub struct UserKey(String);

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserKey(<redacted>)")
    }
}

/// Configuration for the admin key middleware
#[derive(Clone, Debug)]
pub struct AdminAuthConfig {
    /// `None` leaves the admin API open
    pub user_key: Option<UserKey>,
    /// Paths that bypass the key check
    pub bypass_paths: HashSet<String>,
}

impl Default for AdminAuthConfig {
    fn default() -> Self {
        Self {
            user_key: None,
            bypass_paths: HashSet::from([paths::HEALTH.to_string()]),
        }
    }
}

impl AdminAuthConfig {
    /// Build from the configured key; a blank key disables the check.
    pub fn from_user_key(user_key: Option<&str>) -> Self {
        Self {
            user_key: user_key.and_then(|key| UserKey::try_new(key).ok()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeyParam {
    key: Option<String>,
}

/// Request ID middleware - ensures every request has a unique ID for tracing
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::now_v7);

    let header_value = HeaderValue::from_str(&request_id.to_string()).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    }

    let response = next.run(request).await;
    let mut response = attach_request_id(response, &request_id.to_string());

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        "Incoming request"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        warn!(
            request_id = request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed with server error"
        );
    } else {
        info!(
            request_id = request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Admin key middleware - `x-api-key` header or `?key=` query parameter
pub async fn admin_key_middleware(
    State(auth_config): State<Arc<AdminAuthConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let Some(expected) = &auth_config.user_key else {
        return Ok(next.run(request).await);
    };

    if auth_config.bypass_paths.contains(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let from_header = request
        .headers()
        .get(X_API_KEY)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let provided = from_header.or_else(|| {
        Query::<KeyParam>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(param)| param.key)
    });

    match provided {
        None => {
            warn!(path = %request.uri().path(), "{}", admin::MISSING_USER_KEY);
            Err(Error::Unauthorized)
        }
        Some(key) if key.trim() == expected.as_ref() => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "{}", admin::INVALID_USER_KEY);
            Err(Error::Forbidden)
        }
    }
}
