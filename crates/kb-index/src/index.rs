//! Tenant-filtered vector storage. [`FilteredQuery`] is the only way to build a search or
//! delete predicate, and it cannot be constructed without a `workspace_id` -- the centralized
//! query builder §5 requires so that no code path can issue an unfiltered base query.

use async_trait::async_trait;
use dashmap::DashMap;
use kb_core::types::{ChunkId, DocumentId, KbId, WorkspaceId};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: record has {got} dims, index expects {expected}")]
    DimensionMismatch { got: usize, expected: usize },
    #[error("record payload.kb_id {got} does not match upsert target {expected}")]
    KbIdMismatch { got: KbId, expected: KbId },
    #[error("record payload.workspace_id {got} does not match kb's workspace {expected}")]
    WorkspaceIdMismatch { got: WorkspaceId, expected: WorkspaceId },
    #[error("knowledge base {0} has no index yet")]
    KbNotFound(KbId),
}

impl IndexError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        match self {
            IndexError::DimensionMismatch { .. } => kb_core::ErrorKind::InvalidArgument,
            IndexError::KbIdMismatch { .. } | IndexError::WorkspaceIdMismatch { .. } => {
                kb_core::ErrorKind::ProfileMismatch
            }
            IndexError::KbNotFound(_) => kb_core::ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// What's attached to every stored vector. `workspace_id` is the authoritative tenant filter;
/// every query must carry it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorPayload {
    pub kb_id: KbId,
    pub workspace_id: WorkspaceId,
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    pub ordinal: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorRecord {
    pub vector_id: ChunkId,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// A search/delete predicate. Can only be built starting from [`FilteredQuery::new`], which
/// requires a `workspace_id` -- there is no way to end up with a query lacking one.
#[derive(Debug, Clone)]
pub struct FilteredQuery {
    workspace_id: WorkspaceId,
    document_id: Option<DocumentId>,
    enabled_only: bool,
    vector_ids: Option<Vec<ChunkId>>,
}

impl FilteredQuery {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self { workspace_id, document_id: None, enabled_only: false, vector_ids: None }
    }

    pub fn document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn enabled_only(mut self) -> Self {
        self.enabled_only = true;
        self
    }

    pub fn vector_ids(mut self, ids: Vec<ChunkId>) -> Self {
        self.vector_ids = Some(ids);
        self
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    fn matches(&self, payload: &VectorPayload, vector_id: ChunkId) -> bool {
        if payload.workspace_id != self.workspace_id {
            return false;
        }
        if let Some(doc_id) = self.document_id {
            if payload.document_id != doc_id {
                return false;
            }
        }
        if self.enabled_only && !payload.enabled {
            return false;
        }
        if let Some(ids) = &self.vector_ids {
            if !ids.contains(&vector_id) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent: a record with an existing `vector_id` overwrites the prior one.
    async fn upsert(&self, kb_id: KbId, records: Vec<VectorRecord>) -> Result<()>;

    /// Succeeds even when some ids in `filter` don't exist.
    async fn delete(&self, kb_id: KbId, filter: FilteredQuery) -> Result<u64>;

    async fn search(&self, kb_id: KbId, query_vector: &[f32], k: usize, filter: FilteredQuery) -> Result<Vec<ScoredRecord>>;

    async fn count(&self, kb_id: KbId, filter: FilteredQuery) -> Result<u64>;

    /// Flips `payload.enabled` on an existing vector in place. Succeeds as a no-op if
    /// `vector_id` doesn't exist -- disabling a chunk that was never indexed isn't an
    /// error. SS4.7: catalog-level disable must also be reflected here so index-level
    /// filters exclude it without a full reprocess.
    async fn set_enabled(&self, kb_id: KbId, vector_id: ChunkId, enabled: bool) -> Result<()>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

struct KbShard {
    dimension: usize,
    workspace_id: WorkspaceId,
    records: DashMap<ChunkId, VectorRecord>,
}

/// In-memory reference `VectorIndex`, one shard per `kb_id`. A shard's `dimension` and
/// `workspace_id` are fixed by its first upsert and checked on every subsequent one --
/// mirroring `embedding_profile`'s immutability in the durable catalog.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    shards: DashMap<KbId, Arc<KbShard>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, kb_id: KbId, records: Vec<VectorRecord>) -> Result<()> {
        for record in &records {
            if record.payload.kb_id != kb_id {
                return Err(IndexError::KbIdMismatch { got: record.payload.kb_id, expected: kb_id });
            }
        }

        let shard = match self.shards.get(&kb_id) {
            Some(shard) => shard.clone(),
            None => {
                let workspace_id = records.first().map(|r| r.payload.workspace_id).unwrap_or_default();
                let dimension = records.first().map(|r| r.vector.len()).unwrap_or(0);
                let shard = Arc::new(KbShard { dimension, workspace_id, records: DashMap::new() });
                self.shards.insert(kb_id, shard.clone());
                shard
            }
        };

        for record in records {
            if record.payload.workspace_id != shard.workspace_id {
                return Err(IndexError::WorkspaceIdMismatch {
                    got: record.payload.workspace_id,
                    expected: shard.workspace_id,
                });
            }
            if record.vector.len() != shard.dimension {
                return Err(IndexError::DimensionMismatch { got: record.vector.len(), expected: shard.dimension });
            }
            shard.records.insert(record.vector_id, record);
        }
        Ok(())
    }

    async fn delete(&self, kb_id: KbId, filter: FilteredQuery) -> Result<u64> {
        let shard = match self.shards.get(&kb_id) {
            Some(shard) => shard.clone(),
            None => return Ok(0),
        };
        let to_remove: Vec<ChunkId> = shard
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.value().payload, *entry.key()))
            .map(|entry| *entry.key())
            .collect();
        let removed = to_remove.len() as u64;
        for id in to_remove {
            shard.records.remove(&id);
        }
        Ok(removed)
    }

    async fn search(&self, kb_id: KbId, query_vector: &[f32], k: usize, filter: FilteredQuery) -> Result<Vec<ScoredRecord>> {
        let shard = self.shards.get(&kb_id).map(|s| s.clone()).ok_or(IndexError::KbNotFound(kb_id))?;

        let mut scored: Vec<ScoredRecord> = shard
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.value().payload, *entry.key()))
            .map(|entry| {
                let record = entry.value().clone();
                let score = cosine_similarity(query_vector, &record.vector);
                ScoredRecord { record, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, kb_id: KbId, filter: FilteredQuery) -> Result<u64> {
        let shard = match self.shards.get(&kb_id) {
            Some(shard) => shard.clone(),
            None => return Ok(0),
        };
        let count = shard
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.value().payload, *entry.key()))
            .count();
        Ok(count as u64)
    }

    async fn set_enabled(&self, kb_id: KbId, vector_id: ChunkId, enabled: bool) -> Result<()> {
        let Some(shard) = self.shards.get(&kb_id) else {
            return Ok(());
        };
        if let Some(mut record) = shard.records.get_mut(&vector_id) {
            record.payload.enabled = enabled;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kb_id: KbId, workspace_id: WorkspaceId, document_id: DocumentId, vector: Vec<f32>, enabled: bool) -> VectorRecord {
        let vector_id = ChunkId::new();
        VectorRecord {
            vector_id,
            vector,
            payload: VectorPayload { kb_id, workspace_id, document_id, chunk_id: vector_id, ordinal: 0, enabled },
        }
    }

    #[tokio::test]
    async fn test_upsert_then_search_returns_top_k() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let workspace_id = WorkspaceId::new();
        let document_id = DocumentId::new();

        let records = vec![
            record(kb_id, workspace_id, document_id, vec![1.0, 0.0], true),
            record(kb_id, workspace_id, document_id, vec![0.0, 1.0], true),
        ];
        index.upsert(kb_id, records).await.unwrap();

        let results = index.search(kb_id, &[1.0, 0.0], 1, FilteredQuery::new(workspace_id)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_vector_id() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let workspace_id = WorkspaceId::new();
        let document_id = DocumentId::new();

        let mut r = record(kb_id, workspace_id, document_id, vec![1.0, 0.0], true);
        index.upsert(kb_id, vec![r.clone()]).await.unwrap();
        r.vector = vec![0.0, 1.0];
        index.upsert(kb_id, vec![r.clone()]).await.unwrap();

        let count = index.count(kb_id, FilteredQuery::new(workspace_id)).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_search_without_workspace_id_is_unrepresentable() {
        // FilteredQuery::new requires a workspace_id at construction; there is no
        // zero-argument constructor that would produce an unfiltered query.
        let query = FilteredQuery::new(WorkspaceId::new());
        assert!(!query.enabled_only);
    }

    #[tokio::test]
    async fn test_kb_id_mismatch_rejected() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let other_kb = KbId::new();
        let workspace_id = WorkspaceId::new();
        let document_id = DocumentId::new();

        let r = record(other_kb, workspace_id, document_id, vec![1.0, 0.0], true);
        let err = index.upsert(kb_id, vec![r]).await.unwrap_err();
        assert!(matches!(err, IndexError::KbIdMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_by_document_id() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let workspace_id = WorkspaceId::new();
        let document_id = DocumentId::new();
        let other_document = DocumentId::new();

        index
            .upsert(
                kb_id,
                vec![
                    record(kb_id, workspace_id, document_id, vec![1.0, 0.0], true),
                    record(kb_id, workspace_id, other_document, vec![0.0, 1.0], true),
                ],
            )
            .await
            .unwrap();

        let removed = index
            .delete(kb_id, FilteredQuery::new(workspace_id).document(document_id))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.count(kb_id, FilteredQuery::new(workspace_id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enabled_only_filters_disabled_records() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let workspace_id = WorkspaceId::new();
        let document_id = DocumentId::new();

        index
            .upsert(
                kb_id,
                vec![
                    record(kb_id, workspace_id, document_id, vec![1.0, 0.0], true),
                    record(kb_id, workspace_id, document_id, vec![0.0, 1.0], false),
                ],
            )
            .await
            .unwrap();

        let count = index.count(kb_id, FilteredQuery::new(workspace_id).enabled_only()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_search_missing_kb_returns_not_found() {
        let index = InMemoryVectorIndex::new();
        let err = index
            .search(KbId::new(), &[1.0, 0.0], 5, FilteredQuery::new(WorkspaceId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::KbNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_ids_succeeds() {
        let index = InMemoryVectorIndex::new();
        let kb_id = KbId::new();
        let workspace_id = WorkspaceId::new();
        index
            .upsert(kb_id, vec![record(kb_id, workspace_id, DocumentId::new(), vec![1.0], true)])
            .await
            .unwrap();
        let removed = index
            .delete(kb_id, FilteredQuery::new(workspace_id).vector_ids(vec![ChunkId::new()]))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
