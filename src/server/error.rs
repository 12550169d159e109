//! Server Error Types
//!
//! Defines error types for the HTTP layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::hub::HubError;
use crate::tree::TreeError;
use crate::watchable::WatchError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// No route, file or watchable at this path
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Path traversal or access outside the document root
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The route exists but does not accept this method
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: Method, allow: Vec<Method> },

    /// A watchable rejected the value
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request took longer than the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// A dynamic content generator failed
    #[error("Generator error: {0}")]
    Generator(String),

    /// The requested byte range lies outside the file
    #[error("Range not satisfiable (size {size})")]
    RangeNotSatisfiable { size: u64 },

    /// Live connections cannot be accepted right now
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ServerError {
    /// Status code and machine-readable code for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ServerError::MethodNotAllowed { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED")
            }
            ServerError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ServerError::Timeout => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT"),
            ServerError::Generator(_) => (StatusCode::INTERNAL_SERVER_ERROR, "GENERATOR_ERROR"),
            ServerError::RangeNotSatisfiable { .. } => {
                (StatusCode::RANGE_NOT_SATISFIABLE, "RANGE_NOT_SATISFIABLE")
            }
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ServerError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl From<WatchError> for ServerError {
    fn from(err: WatchError) -> Self {
        if err.is_not_found() {
            return ServerError::NotFound(err.to_string());
        }
        match err {
            WatchError::Validation { .. } => ServerError::Validation(err.to_string()),
            WatchError::Tree(tree) => tree.into(),
            other => ServerError::BadRequest(other.to_string()),
        }
    }
}

impl From<TreeError> for ServerError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(_) => ServerError::NotFound(err.to_string()),
            _ => ServerError::BadRequest(err.to_string()),
        }
    }
}

impl From<HubError> for ServerError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::TooManyConnections(_) | HubError::ShuttingDown => {
                ServerError::ServiceUnavailable(err.to_string())
            }
            HubError::ConnectionNotFound(_) => ServerError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        // Log the error
        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let extra = match &self {
            ServerError::MethodNotAllowed { allow, .. } => {
                let list = allow
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                HeaderValue::from_str(&list)
                    .ok()
                    .map(|v| (header::ALLOW, v))
            }
            ServerError::RangeNotSatisfiable { size } => {
                HeaderValue::from_str(&format!("bytes */{}", size))
                    .ok()
                    .map(|v| (header::CONTENT_RANGE, v))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some((name, value)) = extra {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_error_mapping() {
        let err: ServerError = WatchError::NotWatchable("/app".into()).into();
        assert_eq!(err.status().0, StatusCode::NOT_FOUND);

        let err: ServerError = WatchError::Validation {
            path: "/x".into(),
            reason: "too big".into(),
        }
        .into();
        assert_eq!(err.status().0, StatusCode::UNPROCESSABLE_ENTITY);

        let err: ServerError = WatchError::Tree(TreeError::InvalidSlice("step".into())).into();
        assert_eq!(err.status().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_method_not_allowed_sets_allow_header() {
        let response = ServerError::MethodNotAllowed {
            method: Method::POST,
            allow: vec![Method::GET, Method::HEAD],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }

    #[test]
    fn test_range_error_sets_content_range() {
        let response = ServerError::RangeNotSatisfiable { size: 1000 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }

    #[test]
    fn test_hub_errors_are_unavailable() {
        let err: ServerError = HubError::TooManyConnections(4).into();
        assert_eq!(err.status().0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
