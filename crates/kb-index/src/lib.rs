//! Vector index and embedder for the knowledge base ETL pipeline (C1/C2).
//!
//! [`index`] is a tenant-filtered `VectorIndex` trait plus an in-memory `DashMap`-backed
//! reference implementation; [`embed`] is an `Embedder` trait plus a deterministic local
//! hashing provider. Both are intentionally provider-agnostic: a real vector database or
//! managed embedding API plugs in behind the same traits without touching the orchestrator.

pub mod embed;
pub mod index;

// Re-exports
pub use embed::{EmbedContext, EmbedError, Embedder, EmbeddingProfile, HashingEmbedder};
pub use index::{FilteredQuery, IndexError, InMemoryVectorIndex, ScoredRecord, VectorIndex, VectorPayload, VectorRecord};
