//! Maps every crate's error taxonomy (`kb_core::ErrorKind`) onto an HTTP response.
//!
//! Every handler returns `ApiResult<T>`; `ApiError` is the single place that decides a
//! status code, so a new upstream error type only needs a `From` impl here, never a
//! match arm in every handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kb_core::ErrorKind;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: status_for_kind(kind),
            kind: kind_name(kind),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::ConflictState => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::DataError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ProfileMismatch => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidArgument => "invalid_argument",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::ConflictState => "conflict_state",
        ErrorKind::Transient => "transient",
        ErrorKind::ResourceExhausted => "resource_exhausted",
        ErrorKind::DataError => "data_error",
        ErrorKind::ProfileMismatch => "profile_mismatch",
        ErrorKind::Internal => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.kind.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<kb_catalog::DraftError> for ApiError {
    fn from(err: kb_catalog::DraftError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<kb_catalog::CatalogError> for ApiError {
    fn from(err: kb_catalog::CatalogError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<kb_workflow::WorkflowError> for ApiError {
    fn from(err: kb_workflow::WorkflowError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<kb_index::IndexError> for ApiError {
    fn from(err: kb_index::IndexError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<kb_core::AppError> for ApiError {
    fn from(err: kb_core::AppError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_kind_not_found() {
        let err = ApiError::not_found("draft d-1");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.kind, "not_found");
    }

    #[test]
    fn test_draft_error_conversion() {
        let err: ApiError = kb_catalog::DraftError::Forbidden.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_profile_mismatch_is_conflict() {
        let err = ApiError::new(ErrorKind::ProfileMismatch, "dimension mismatch");
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
