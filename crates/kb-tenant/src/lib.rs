//! Multi-tenant isolation for the Knowledge Base ETL Pipeline.
//!
//! This crate provides:
//! - The `Tenant` entity, one schema/vector-namespace per workspace
//! - Schema and vector-namespace isolation managers
//! - Per-workspace resource quotas (concurrent runs, chunks, vectors, drafts)

pub mod tenant;
pub mod isolation;
pub mod quota;

pub use tenant::*;
pub use isolation::*;
pub use quota::*;

use thiserror::Error;

/// Multi-tenancy errors.
#[derive(Error, Debug)]
pub enum TenantError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Tenant is disabled: {0}")]
    Disabled(String),

    #[error("Tenant is suspended: {0}")]
    Suspended(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid tenant configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Isolation error: {0}")]
    Isolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TenantError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        use kb_core::ErrorKind;
        match self {
            TenantError::NotFound(_) => ErrorKind::NotFound,
            TenantError::AlreadyExists(_) => ErrorKind::ConflictState,
            TenantError::Disabled(_) | TenantError::Suspended(_) => ErrorKind::Forbidden,
            TenantError::QuotaExceeded(_) => ErrorKind::ResourceExhausted,
            TenantError::InvalidConfiguration(_) => ErrorKind::InvalidArgument,
            TenantError::Database(_) | TenantError::Isolation(_) => ErrorKind::Transient,
            TenantError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, TenantError>;
