//! Generic persistence and health-check traits shared by the catalog, draft store, and tenant
//! crates. Kept separate from `cache.rs`/`events.rs` because repositories are entity-typed and
//! transactional rather than string-keyed.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A workspace-scoped CRUD repository over some entity type `T` keyed by `Id`.
#[async_trait]
pub trait Repository: Send + Sync {
    type Id: Send + Sync;
    type Entity: Serialize + DeserializeOwned + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, id: &Self::Id) -> Result<Option<Self::Entity>, Self::Error>;
    async fn put(&self, entity: Self::Entity) -> Result<(), Self::Error>;
    async fn delete(&self, id: &Self::Id) -> Result<bool, Self::Error>;
}

/// A unit-of-work boundary. Implementors commit all writes made through `Self::Handle` atomically
/// on `commit`, or discard them on `rollback` / drop.
#[async_trait]
pub trait Transaction: Send + Sync {
    type Handle: Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn begin(&self) -> Result<Self::Handle, Self::Error>;
    async fn commit(&self, handle: Self::Handle) -> Result<(), Self::Error>;
    async fn rollback(&self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// The outcome of a single dependency health probe (database, cache, downstream adapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthStatus;

    fn name(&self) -> &str;
}

/// Turns text into vectors. Shared by the embedding stage and by chunking strategies
/// (`semantic`, `hybrid`) that need sentence-level embeddings to find topic breaks -- both
/// call the same batched implementation rather than running a separate model.
#[async_trait]
pub trait Embedder: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Self::Error>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_is_healthy() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".into()).is_healthy());
        assert!(!HealthStatus::Unhealthy("down".into()).is_healthy());
    }
}
