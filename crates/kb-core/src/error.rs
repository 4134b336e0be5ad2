//! The crate-wide error taxonomy. Every error type defined further down the dependency graph
//! (`kb-tenant::TenantError`, `kb-adapters::AdapterError`, `kb-workflow::WorkflowError`, ...)
//! exposes a `kind() -> ErrorKind` method so the orchestrator can decide retry/fail behavior
//! without matching on concrete error types.

use thiserror::Error;

/// The stable classification every crate-level error maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied a malformed or out-of-range argument. Not retryable.
    InvalidArgument,
    /// The referenced entity does not exist (or is invisible to the caller's workspace).
    NotFound,
    /// The caller's role does not permit the operation.
    Forbidden,
    /// The operation conflicts with the entity's current state (e.g. finalizing a draft twice).
    ConflictState,
    /// A transient failure upstream (network, rate limit, timeout). Safe to retry with backoff.
    Transient,
    /// A quota or capacity limit was hit. Not retryable until capacity frees up.
    ResourceExhausted,
    /// The input data itself is malformed (parse failure, encoding error, corrupt content).
    DataError,
    /// An embedding profile mismatch was detected. Fatal — never retried.
    ProfileMismatch,
    /// An unexpected internal error. Treated as non-retryable unless a caller decides otherwise.
    Internal,
}

impl ErrorKind {
    /// Whether an operation that failed with this kind is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// The root application error. Crates lower in the dependency graph define their own
/// `thiserror` enums and convert into this one at their public boundary, or wrap it directly.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflicting state: {0}")]
    ConflictState(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("data error: {0}")]
    DataError(String),

    #[error("embedding profile mismatch: {0}")]
    ProfileMismatch(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::ConflictState(_) => ErrorKind::ConflictState,
            AppError::Transient(_) => ErrorKind::Transient,
            AppError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            AppError::DataError(_) => ErrorKind::DataError,
            AppError::ProfileMismatch(_) => ErrorKind::ProfileMismatch,
            AppError::Internal(_) => ErrorKind::Internal,
            AppError::Configuration(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AppError::NotFound("kb".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::Transient("timeout".into()).kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_retryable_only_transient() {
        assert!(AppError::Transient("x".into()).is_retryable());
        assert!(!AppError::DataError("x".into()).is_retryable());
        assert!(!AppError::ProfileMismatch("x".into()).is_retryable());
    }
}
