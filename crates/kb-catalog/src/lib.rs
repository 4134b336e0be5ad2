//! Durable KB/Document/Chunk catalog, draft store, and reconciler (C6 + C8).
//!
//! `model` holds the persisted shapes, `catalog` is the durable repository the rest of
//! the workspace reads/writes KBs and documents through, `draft` is the TTL-bounded
//! authoring surface a draft goes through before it becomes a KB, and `reconciler` is
//! the background sweep that keeps the catalog and the vector index honest.

pub mod catalog;
pub mod draft;
pub mod handlers;
pub mod model;
pub mod reconciler;

pub use catalog::{CatalogRepository, InMemoryCatalogRepository};
pub use draft::{AdapterRegistry, DraftRepository, DraftService, InMemoryDraftRepository};
pub use handlers::{ChunkHandler, EmbedHandler, IndexHandler, IngestHandler, ParseHandler};
pub use reconciler::Reconciler;

use thiserror::Error;

/// Errors from the durable catalog (KBs, documents, chunks, runs).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflicting state: {0}")]
    ConflictState(String),

    #[error("data error: {0}")]
    DataError(String),

    #[error("workflow error: {0}")]
    Workflow(#[from] kb_workflow::WorkflowError),

    #[error("index error: {0}")]
    Index(#[from] kb_index::IndexError),

    #[error("core error: {0}")]
    Core(#[from] kb_core::AppError),
}

impl CatalogError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        match self {
            CatalogError::NotFound(_) => kb_core::ErrorKind::NotFound,
            CatalogError::InvalidArgument(_) => kb_core::ErrorKind::InvalidArgument,
            CatalogError::ConflictState(_) => kb_core::ErrorKind::ConflictState,
            CatalogError::DataError(_) => kb_core::ErrorKind::DataError,
            CatalogError::Workflow(err) => err.kind(),
            CatalogError::Index(err) => err.kind(),
            CatalogError::Core(err) => err.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors from the draft store (C6). Kept distinct from `CatalogError` because a draft
/// is not yet a catalog entity and has its own lifecycle failure modes (expiry, ACL).
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("forbidden")]
    Forbidden,

    #[error("conflicting state: {0}")]
    ConflictState(String),

    #[error("draft expired: {0}")]
    ExpiredDraft(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("core error: {0}")]
    Core(#[from] kb_core::AppError),
}

impl DraftError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        match self {
            DraftError::NotFound(_) => kb_core::ErrorKind::NotFound,
            DraftError::InvalidArgument(_) => kb_core::ErrorKind::InvalidArgument,
            DraftError::Forbidden => kb_core::ErrorKind::Forbidden,
            DraftError::ConflictState(_) => kb_core::ErrorKind::ConflictState,
            DraftError::ExpiredDraft(_) => kb_core::ErrorKind::ConflictState,
            DraftError::QuotaExceeded(_) => kb_core::ErrorKind::ResourceExhausted,
            DraftError::Catalog(err) => err.kind(),
            DraftError::Core(err) => err.kind(),
        }
    }
}

pub type DraftResult<T> = std::result::Result<T, DraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_kind_mapping() {
        let err = CatalogError::NotFound("kb-1".to_string());
        assert_eq!(err.kind(), kb_core::ErrorKind::NotFound);
    }

    #[test]
    fn test_draft_error_kind_mapping() {
        assert_eq!(DraftError::Forbidden.kind(), kb_core::ErrorKind::Forbidden);
        assert_eq!(
            DraftError::ExpiredDraft("d-1".to_string()).kind(),
            kb_core::ErrorKind::ConflictState
        );
    }
}
