//! Source adapters for the Knowledge Base ETL Pipeline.
//!
//! One adapter per `SourceKind` (web/file/cloud/text/composite), each exposing
//! `validate`/`probe`/`fetch` behind the `SourceAdapter` trait. Every outbound call goes
//! through `kb_infra::resilience`'s retry policy and circuit breaker.

pub mod cloud;
pub mod composite;
pub mod file;
pub mod text;
pub mod traits;
pub mod url_canon;
pub mod web;

pub use cloud::{CloudAdapter, CloudConfig, CredentialStore};
pub use composite::CompositeAdapter;
pub use file::{FileAdapter, FileConfig};
pub use text::TextAdapter;
pub use traits::{RawDocumentSink, SourceAdapter, VecSink};
pub use web::{WebAdapter, WebConfig, WebMethod};

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("circuit breaker is open")]
    CircuitBreakerOpen,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        use kb_core::ErrorKind;
        match self {
            AdapterError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AdapterError::NotFound(_) => ErrorKind::NotFound,
            AdapterError::Forbidden(_) => ErrorKind::Forbidden,
            AdapterError::ConnectionError(_)
            | AdapterError::RequestFailed(_)
            | AdapterError::CircuitBreakerOpen
            | AdapterError::Timeout(_)
            | AdapterError::ServiceUnavailable(_) => ErrorKind::Transient,
            AdapterError::SerializationError(_) | AdapterError::InvalidResponse(_) => {
                ErrorKind::DataError
            }
            AdapterError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Flattens a `kb_infra` resilience-layer error into the adapter's own error type, so
/// callers only ever see `AdapterResult`.
pub fn resilience_to_adapter_error(err: kb_infra::resilience::ResilienceError<AdapterError>) -> AdapterError {
    use kb_infra::resilience::ResilienceError;
    match err {
        ResilienceError::CircuitOpen => AdapterError::CircuitBreakerOpen,
        ResilienceError::Timeout => AdapterError::Timeout("resilience timeout".into()),
        ResilienceError::BulkheadRejected => AdapterError::ServiceUnavailable("bulkhead rejected".into()),
        ResilienceError::RetriesExhausted(e) | ResilienceError::OperationFailed(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AdapterError::NotFound("x".into()).kind(), kb_core::ErrorKind::NotFound);
        assert_eq!(AdapterError::Timeout("x".into()).kind(), kb_core::ErrorKind::Transient);
        assert_eq!(
            AdapterError::InvalidArgument("x".into()).kind(),
            kb_core::ErrorKind::InvalidArgument
        );
    }
}
