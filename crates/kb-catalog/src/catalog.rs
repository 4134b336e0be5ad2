//! The durable repository of KBs, documents, chunks, and runs (C8).
//!
//! `CatalogRepository` mirrors the shape of `kb_core::traits::Repository`/`Transaction`
//! but with entity-specific signatures (`get_kb`, `put_document`, ...) rather than one
//! generic `get<T>`, the same way `kb_adapters::SourceAdapter` favors concrete methods
//! over a single generic trait. Every lookup is workspace-scoped: a KB that exists but
//! belongs to another workspace is reported `NotFound`, never `Forbidden`, so a caller
//! cannot distinguish "wrong workspace" from "doesn't exist".

use crate::model::{
    ChunkCounts, ChunkRecord, Document, DocumentCounts, DocumentStatus, KbStatus, KnowledgeBase,
    Stats,
};
use crate::{CatalogError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use kb_core::types::{ChunkId, DocumentId, KbId, WorkspaceId};
use kb_workflow::PipelineRun;
use std::sync::Arc;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<KnowledgeBase>;
    async fn list_kbs(&self, workspace_id: WorkspaceId) -> Result<Vec<KnowledgeBase>>;
    async fn put_kb(&self, kb: KnowledgeBase) -> Result<()>;
    async fn delete_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<()>;

    async fn get_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<Document>;
    async fn list_documents(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Vec<Document>>;
    async fn put_document(&self, workspace_id: WorkspaceId, document: Document) -> Result<()>;
    async fn delete_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<()>;

    async fn list_chunks(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<Vec<ChunkRecord>>;
    async fn list_chunks_for_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Vec<ChunkRecord>>;
    async fn put_chunk(&self, workspace_id: WorkspaceId, chunk: ChunkRecord) -> Result<()>;
    async fn set_chunk_enabled(&self, workspace_id: WorkspaceId, chunk_id: ChunkId, enabled: bool) -> Result<()>;
    async fn delete_chunks_for_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<()>;

    async fn put_run(&self, workspace_id: WorkspaceId, run: PipelineRun) -> Result<()>;
    async fn get_run(&self, workspace_id: WorkspaceId, run_id: &str) -> Result<PipelineRun>;

    async fn stats(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Stats>;
}

#[derive(Clone)]
struct WorkspaceScoped<T> {
    workspace_id: WorkspaceId,
    value: T,
}

/// `DashMap`-backed reference implementation. Every entry is wrapped with the
/// workspace it belongs to so a cross-workspace lookup surfaces as `NotFound`.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    kbs: DashMap<KbId, WorkspaceScoped<KnowledgeBase>>,
    documents: DashMap<DocumentId, WorkspaceScoped<Document>>,
    chunks: DashMap<ChunkId, WorkspaceScoped<ChunkRecord>>,
    runs: DashMap<String, WorkspaceScoped<PipelineRun>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn get_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<KnowledgeBase> {
        self.kbs
            .get(&kb_id)
            .filter(|entry| entry.workspace_id == workspace_id)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("kb {kb_id}")))
    }

    async fn list_kbs(&self, workspace_id: WorkspaceId) -> Result<Vec<KnowledgeBase>> {
        Ok(self
            .kbs
            .iter()
            .filter(|entry| entry.workspace_id == workspace_id)
            .map(|entry| entry.value.value.clone())
            .collect())
    }

    async fn put_kb(&self, kb: KnowledgeBase) -> Result<()> {
        let workspace_id = kb.workspace_id;
        self.kbs.insert(kb.id, WorkspaceScoped { workspace_id, value: kb });
        Ok(())
    }

    async fn delete_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<()> {
        self.get_kb(workspace_id, kb_id).await?;
        self.kbs.remove(&kb_id);
        self.documents.retain(|_, entry| entry.value.kb_id != kb_id);
        self.chunks.retain(|_, entry| entry.value.kb_id != kb_id);
        Ok(())
    }

    async fn get_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<Document> {
        self.documents
            .get(&document_id)
            .filter(|entry| entry.workspace_id == workspace_id)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("document {document_id}")))
    }

    async fn list_documents(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.workspace_id == workspace_id && entry.value.kb_id == kb_id)
            .map(|entry| entry.value.value.clone())
            .collect())
    }

    async fn put_document(&self, workspace_id: WorkspaceId, document: Document) -> Result<()> {
        self.documents.insert(document.id, WorkspaceScoped { workspace_id, value: document });
        Ok(())
    }

    async fn delete_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<()> {
        self.get_document(workspace_id, document_id).await?;
        self.documents.remove(&document_id);
        self.chunks.retain(|_, entry| entry.value.document_id != document_id);
        Ok(())
    }

    async fn list_chunks(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<Vec<ChunkRecord>> {
        let mut chunks: Vec<ChunkRecord> = self
            .chunks
            .iter()
            .filter(|entry| entry.workspace_id == workspace_id && entry.value.document_id == document_id)
            .map(|entry| entry.value.value.clone())
            .collect();
        chunks.sort_by_key(|chunk| chunk.ordinal);
        Ok(chunks)
    }

    async fn list_chunks_for_kb(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .chunks
            .iter()
            .filter(|entry| entry.workspace_id == workspace_id && entry.value.kb_id == kb_id)
            .map(|entry| entry.value.value.clone())
            .collect())
    }

    async fn put_chunk(&self, workspace_id: WorkspaceId, chunk: ChunkRecord) -> Result<()> {
        self.chunks.insert(chunk.id, WorkspaceScoped { workspace_id, value: chunk });
        Ok(())
    }

    async fn set_chunk_enabled(&self, workspace_id: WorkspaceId, chunk_id: ChunkId, enabled: bool) -> Result<()> {
        let mut entry = self
            .chunks
            .get_mut(&chunk_id)
            .filter(|entry| entry.workspace_id == workspace_id)
            .ok_or_else(|| CatalogError::NotFound(format!("chunk {chunk_id}")))?;
        entry.value.enabled = enabled;
        Ok(())
    }

    async fn delete_chunks_for_document(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> Result<()> {
        self.chunks
            .retain(|_, entry| !(entry.workspace_id == workspace_id && entry.value.document_id == document_id));
        Ok(())
    }

    async fn put_run(&self, workspace_id: WorkspaceId, run: PipelineRun) -> Result<()> {
        self.runs.insert(run.run_id.clone(), WorkspaceScoped { workspace_id, value: run });
        Ok(())
    }

    async fn get_run(&self, workspace_id: WorkspaceId, run_id: &str) -> Result<PipelineRun> {
        self.runs
            .get(run_id)
            .filter(|entry| entry.workspace_id == workspace_id)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("run {run_id}")))
    }

    async fn stats(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Stats> {
        self.get_kb(workspace_id, kb_id).await?;

        let documents: Vec<Document> = self.list_documents(workspace_id, kb_id).await?;
        let mut by_status: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut active = 0u64;
        for document in &documents {
            *by_status.entry(format!("{:?}", document.status).to_lowercase()).or_insert(0) += 1;
            if document.status.is_active() {
                active += 1;
            }
        }
        let document_counts = DocumentCounts {
            total: documents.iter().filter(|d| d.status != DocumentStatus::Disabled).count() as u64,
            active,
            by_status,
        };

        let mut total_chunks = 0u64;
        let mut enabled_chunks = 0u64;
        let mut last_indexed_at = None;
        for document in &documents {
            for chunk in self.list_chunks(workspace_id, document.id).await? {
                total_chunks += 1;
                if chunk.enabled {
                    enabled_chunks += 1;
                }
            }
            if document.status == DocumentStatus::Indexed {
                last_indexed_at = last_indexed_at.max(Some(document.updated_at));
            }
        }

        Ok(Stats {
            documents: document_counts,
            chunks: ChunkCounts { total: total_chunks, enabled: enabled_chunks },
            last_indexed_at,
        })
    }
}

/// Marks a KB `ready` once its current run finishes cleanly; used by the
/// reconciler and the orchestrator's completion path alike.
pub async fn mark_kb_status(
    repo: &Arc<dyn CatalogRepository>,
    workspace_id: WorkspaceId,
    kb_id: KbId,
    status: KbStatus,
) -> Result<()> {
    let mut kb = repo.get_kb(workspace_id, kb_id).await?;
    kb.status = status;
    kb.updated_at = chrono::Utc::now();
    repo.put_kb(kb).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KbSpec;
    use kb_core::types::UserId;

    fn make_kb(workspace_id: WorkspaceId) -> KnowledgeBase {
        KnowledgeBase::new(workspace_id, UserId::new(), &KbSpec { name: "docs".into(), ..Default::default() })
    }

    #[tokio::test]
    async fn test_put_and_get_kb_roundtrip() {
        let repo = InMemoryCatalogRepository::new();
        let workspace_id = WorkspaceId::new();
        let kb = make_kb(workspace_id);
        let kb_id = kb.id;
        repo.put_kb(kb).await.unwrap();
        let fetched = repo.get_kb(workspace_id, kb_id).await.unwrap();
        assert_eq!(fetched.id, kb_id);
    }

    #[tokio::test]
    async fn test_cross_workspace_lookup_is_not_found() {
        let repo = InMemoryCatalogRepository::new();
        let kb = make_kb(WorkspaceId::new());
        let kb_id = kb.id;
        repo.put_kb(kb).await.unwrap();
        let err = repo.get_kb(WorkspaceId::new(), kb_id).await.unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_kb_cascades_documents_and_chunks() {
        let repo = InMemoryCatalogRepository::new();
        let workspace_id = WorkspaceId::new();
        let kb = make_kb(workspace_id);
        let kb_id = kb.id;
        repo.put_kb(kb).await.unwrap();

        let document = Document {
            id: DocumentId::new(),
            kb_id,
            source_id: kb_core::types::SourceId::new(),
            title: None,
            uri: "https://example.com/a".into(),
            checksum: "abc".into(),
            status: DocumentStatus::Indexed,
            word_count: 10,
            char_count: 50,
            chunk_count: 1,
            parse_metadata: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        repo.put_document(workspace_id, document.clone()).await.unwrap();

        repo.delete_kb(workspace_id, kb_id).await.unwrap();
        assert!(repo.get_document(workspace_id, document.id).await.is_err());
    }
}
