//! Unified error response handling for the admin API and middleware
//!
//! Every error leaving the service is rendered as the same JSON document,
//! correlated with the request ID header where one is known.

use crate::error::Error;
use crate::proxy::headers::X_REQUEST_ID;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();

        if let Some(id) = request_id {
            if let Ok(header_value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(X_REQUEST_ID, header_value);
            }
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for Error {
    fn to_error_response(&self) -> ErrorResponse {
        use Error::*;

        match self {
            Config(e) => ErrorResponse::new("CONFIG_ERROR", e.to_string()),
            Serialization(e) => ErrorResponse::new("INVALID_JSON", e.to_string()),
            Io(_) => ErrorResponse::new("IO_ERROR", "I/O failure"),
            InvalidInput { field, reason } => {
                ErrorResponse::new("INVALID_INPUT", format!("{field}: {reason}"))
                    .with_details(serde_json::json!({ "field": field }))
            }
            NotFound { resource } => ErrorResponse::new("NOT_FOUND", format!("{resource} not found")),
            Duplicate { existing } => ErrorResponse::new("DUPLICATE_OVERRIDE", self.to_string())
                .with_details(serde_json::json!({ "existingId": existing })),
            PayloadTooLarge { .. } => ErrorResponse::new("PAYLOAD_TOO_LARGE", self.to_string()),
            Unauthorized => ErrorResponse::new("UNAUTHORIZED", "Missing user key"),
            Forbidden => ErrorResponse::new("FORBIDDEN", "Invalid user key"),
            Internal(_) => ErrorResponse::new("INTERNAL_ERROR", "Internal server error"),
        }
    }

    fn status_code(&self) -> StatusCode {
        use Error::*;

        match self {
            Serialization(_) | InvalidInput { .. } => StatusCode::BAD_REQUEST,
            NotFound { .. } => StatusCode::NOT_FOUND,
            Duplicate { .. } => StatusCode::CONFLICT,
            PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,
            Config(_) | Io(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed with server error");
        }
        let error_response = self.to_error_response();
        let mut response = error_response.clone().into_response_with_status(status);
        response.extensions_mut().insert(error_response);
        response
    }
}

/// Re-render an error body produced by [`Error`] with the request's ID.
///
/// Responses that did not come from an `Error` are returned untouched.
pub fn attach_request_id(mut response: Response, request_id: &str) -> Response {
    let Some(error_response) = response.extensions_mut().remove::<ErrorResponse>() else {
        return response;
    };
    if error_response.request_id.is_some() {
        return response;
    }

    let status = response.status();
    let (parts, _) = response.into_parts();
    let mut rendered = error_response
        .with_request_id(request_id)
        .into_response_with_status(status);
    for (name, value) in &parts.headers {
        if *name != axum::http::header::CONTENT_LENGTH && !rendered.headers().contains_key(name) {
            rendered.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RuleId;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new("TEST_ERROR", "Test error message").with_request_id("req-1");
        assert_eq!(error.code, "TEST_ERROR");
        assert_eq!(error.request_id.as_deref(), Some("req-1"));
        assert!(error.details.is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::invalid_input("path", "empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("override").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Duplicate {
                existing: RuleId::generate()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_into_response_body() {
        let response = Error::not_found("override abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["code"], "NOT_FOUND");
        assert_eq!(payload["message"], "override abc not found");
        assert!(payload["requestId"].is_null());
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = Error::Internal("database password wrong".into()).to_error_response();
        assert_eq!(response.message, "Internal server error");
    }

    #[tokio::test]
    async fn test_attach_request_id_fills_error_body() {
        let response = attach_request_id(Error::Forbidden.into_response(), "req-9");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-9");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["code"], "FORBIDDEN");
        assert_eq!(payload["requestId"], "req-9");
    }

    #[test]
    fn test_attach_request_id_ignores_other_responses() {
        let response = attach_request_id((StatusCode::OK, "fine").into_response(), "req-9");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(X_REQUEST_ID));
    }

    #[test]
    fn test_request_id_header_is_set() {
        let response = ErrorResponse::new("NOT_FOUND", "gone")
            .with_request_id("req-123")
            .into_response_with_status(StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-123");
    }
}
