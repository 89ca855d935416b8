//! HTTP error responses
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rpt_core::ReportError;
use serde::Serialize;

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Report(ReportError),
    Internal(String),
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        ApiError::Report(e)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Report(e) => write!(f, "{}", e),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Report(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Report(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        match self {
            ApiError::NotFound(msg) => ErrorResponse {
                error: msg.clone(),
                code: "NOT_FOUND".into(),
            },
            ApiError::BadRequest(msg) => ErrorResponse {
                error: msg.clone(),
                code: "BAD_REQUEST".into(),
            },
            ApiError::Report(e) => ErrorResponse {
                error: e.message(),
                code: e.code().into(),
            },
            ApiError::Internal(msg) => ErrorResponse {
                error: msg.clone(),
                code: "INTERNAL_ERROR".into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
