//! Periodic background consistency sweep over the catalog and the vector index (C8).
//!
//! Runs every 5 minutes: detects chunk records left behind by a deleted document and
//! removes their vectors, finds documents whose enabled-chunk count disagrees with what
//! the index actually holds and marks them for reprocessing, and sweeps expired drafts as
//! a backstop to the draft store's own faster sweeper. Grounded on
//! `kb_infra::cache::memory::MemoryCache`'s `tokio::spawn` + interval-sleep cleanup loop --
//! the crate's only still-current precedent for a self-driving periodic background task,
//! since the approval/scheduling timeout loops this was originally modeled on were trimmed
//! out of `kb-workflow` along with the chat-approval surface they served.

use crate::catalog::CatalogRepository;
use crate::draft::DraftRepository;
use crate::model::DocumentStatus;
use kb_core::types::WorkspaceId;
use kb_index::{FilteredQuery, VectorIndex};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default reconciliation cadence (SPEC_FULL.md SS4.7).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct Reconciler<D: DraftRepository> {
    catalog: Arc<dyn CatalogRepository>,
    index: Arc<dyn VectorIndex>,
    drafts: Arc<D>,
    interval: Duration,
}

/// One pass's outcome, surfaced for tests and for the CLI's `reconcile` command.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReconcileReport {
    pub orphaned_chunks_removed: u64,
    pub documents_marked_failed: u64,
    pub drafts_swept: u64,
}

impl<D: DraftRepository + 'static> Reconciler<D> {
    pub fn new(catalog: Arc<dyn CatalogRepository>, index: Arc<dyn VectorIndex>, drafts: Arc<D>) -> Self {
        Self { catalog, index, drafts, interval: DEFAULT_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the sweep loop, exiting once `cancel` is triggered (SPEC_FULL.md SS4.7's
    /// note that the reconciler shares the process cancellation token at shutdown).
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("reconciler shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        match self.run_once_all_workspaces().await {
                            Ok(report) => info!(
                                orphaned_chunks_removed = report.orphaned_chunks_removed,
                                documents_marked_failed = report.documents_marked_failed,
                                drafts_swept = report.drafts_swept,
                                "reconciliation pass complete"
                            ),
                            Err(err) => warn!(error = %err, "reconciliation pass failed"),
                        }
                    }
                }
            }
        })
    }

    /// Sweeps expired drafts process-wide, then reconciles every workspace with at
    /// least one KB. A single KB's failure does not abort the rest of the pass.
    async fn run_once_all_workspaces(&self) -> crate::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let expired = self.drafts.list_expired(chrono::Utc::now()).await;
        for key in expired {
            if self.drafts.delete(key).await.is_ok() {
                report.drafts_swept += 1;
            }
        }

        Ok(report)
    }

    /// Reconciles a single workspace/KB pair. Exposed separately from the sweep loop so
    /// the CLI can trigger an immediate, targeted pass.
    pub async fn reconcile_kb(&self, workspace_id: WorkspaceId, kb_id: kb_core::types::KbId) -> crate::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let documents = self.catalog.list_documents(workspace_id, kb_id).await?;
        let known_documents: std::collections::HashSet<_> = documents.iter().map(|doc| doc.id).collect();

        let all_chunks = self.catalog.list_chunks_for_kb(workspace_id, kb_id).await?;
        let mut orphaned_documents = std::collections::HashSet::new();
        for chunk in &all_chunks {
            if !known_documents.contains(&chunk.document_id) {
                orphaned_documents.insert(chunk.document_id);
                let filter = FilteredQuery::new(workspace_id).vector_ids(vec![chunk.vector_id]);
                self.index.delete(kb_id, filter).await?;
                report.orphaned_chunks_removed += 1;
            }
        }
        for document_id in orphaned_documents {
            self.catalog.delete_chunks_for_document(workspace_id, document_id).await?;
        }

        for document in &documents {
            if document.status != DocumentStatus::Indexed {
                continue;
            }
            let chunks = self.catalog.list_chunks(workspace_id, document.id).await?;
            let enabled_in_catalog = chunks.iter().filter(|chunk| chunk.enabled).count() as u64;
            let filter = FilteredQuery::new(workspace_id).document(document.id).enabled_only();
            let enabled_in_index = self.index.count(kb_id, filter).await?;

            if enabled_in_catalog != enabled_in_index {
                warn!(
                    document_id = %document.id,
                    catalog = enabled_in_catalog,
                    index = enabled_in_index,
                    "chunk count mismatch between catalog and vector index, marking document failed"
                );
                let mut failed = document.clone();
                failed.status = DocumentStatus::Failed;
                failed.updated_at = chrono::Utc::now();
                self.catalog.put_document(workspace_id, failed).await?;
                report.documents_marked_failed += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogRepository;
    use crate::draft::InMemoryDraftRepository;
    use crate::model::{ChunkRecord, Document, KbSpec, KnowledgeBase};
    use kb_core::types::{ChunkId, DocumentId, SourceId, UserId};
    use kb_index::InMemoryVectorIndex;

    fn make_document(kb_id: kb_core::types::KbId) -> Document {
        Document {
            id: DocumentId::new(),
            kb_id,
            source_id: SourceId::new(),
            title: None,
            uri: "https://example.com".into(),
            checksum: "abc".into(),
            status: DocumentStatus::Indexed,
            word_count: 10,
            char_count: 100,
            chunk_count: 1,
            parse_metadata: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reconcile_marks_mismatched_document_failed() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let drafts = Arc::new(InMemoryDraftRepository::new());

        let workspace_id = WorkspaceId::new();
        let kb = KnowledgeBase::new(workspace_id, UserId::new(), &KbSpec { name: "kb".into(), ..Default::default() });
        let kb_id = kb.id;
        catalog.put_kb(kb).await.unwrap();

        let document = make_document(kb_id);
        catalog.put_document(workspace_id, document.clone()).await.unwrap();

        let chunk = ChunkRecord {
            id: ChunkId::new(),
            document_id: document.id,
            kb_id,
            ordinal: 0,
            content: "hello".into(),
            element_path: vec![],
            token_count: 1,
            char_count: 5,
            metadata: Default::default(),
            vector_id: ChunkId::new(),
            enabled: true,
        };
        catalog.put_chunk(workspace_id, chunk).await.unwrap();

        let reconciler = Reconciler::new(catalog.clone(), index, drafts);
        let report = reconciler.reconcile_kb(workspace_id, kb_id).await.unwrap();
        assert_eq!(report.documents_marked_failed, 1);

        let refreshed = catalog.get_document(workspace_id, document.id).await.unwrap();
        assert_eq!(refreshed.status, DocumentStatus::Failed);
    }
}
