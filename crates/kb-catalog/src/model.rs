//! Durable entities for the catalog and draft store (SPEC_FULL.md SS3).
//!
//! Everything here is persisted (or, for `Draft`, TTL-bounded but still structured); the
//! transient shapes a run moves through (`RawDocument`, `StructuredDocument`, ingestion
//! `Chunk`) live in `kb_core::model` and `kb_ingestion` and are only ever referenced, not
//! redefined, here.

use chrono::{DateTime, Utc};
use kb_core::model::SourceKind;
use kb_core::types::{ChunkId, DocumentId, DraftId, KbId, Metadata, SourceId, UserId, WorkspaceId};
use kb_ingestion::{Chunk as IngestionChunk, ChunkMetadata, ChunkingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbStatus {
    Draft,
    Processing,
    Ready,
    Failed,
    Archived,
}

/// The frozen `(provider, model, dimension)` triple that governs every vector in a KB.
/// Immutable once the KB has a first indexed vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingProfile {
    pub provider_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub normalized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: KbId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub description: String,
    pub status: KbStatus,
    pub embedding_profile: Option<EmbeddingProfile>,
    pub default_chunking: ChunkingConfig,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    pub fn new(workspace_id: WorkspaceId, created_by: UserId, spec: &KbSpec) -> Self {
        let now = Utc::now();
        Self {
            id: KbId::new(),
            workspace_id,
            name: spec.name.clone(),
            description: spec.description.clone(),
            status: KbStatus::Processing,
            embedding_profile: spec.embedding_profile.clone(),
            default_chunking: spec.default_chunking.clone().unwrap_or_default(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request shape for `create_draft`/`finalize`'s KB-level fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbSpec {
    pub name: String,
    pub description: String,
    pub embedding_profile: Option<EmbeddingProfile>,
    pub default_chunking: Option<ChunkingConfig>,
}

/// One input declared on a draft or finalized KB. `reference` and `config` are
/// kind-specific JSON payloads in the same shape `kb_adapters::SourceAdapter` expects,
/// so a finalized source is handed to an adapter without translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub kb_id: KbId,
    pub kind: SourceKind,
    pub reference: serde_json::Value,
    pub config: serde_json::Value,
    pub annotations: Vec<String>,
}

/// Input to `add_source`; becomes a `Source` once assigned an id and a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub reference: serde_json::Value,
    pub config: serde_json::Value,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Patch applied by `update_source`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePatch {
    pub reference: Option<serde_json::Value>,
    pub config: Option<serde_json::Value>,
    pub annotations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Parsing,
    Chunking,
    Embedding,
    Indexed,
    Failed,
    Disabled,
}

impl DocumentStatus {
    /// Statuses counted toward `stats.documents.active` (SPEC_FULL.md SS4.7).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DocumentStatus::Indexed
                | DocumentStatus::Embedding
                | DocumentStatus::Chunking
                | DocumentStatus::Parsing
                | DocumentStatus::Pending
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub kb_id: KbId,
    pub source_id: SourceId,
    pub title: Option<String>,
    pub uri: String,
    pub checksum: String,
    pub status: DocumentStatus,
    pub word_count: usize,
    pub char_count: usize,
    pub chunk_count: usize,
    pub parse_metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The durable counterpart of `kb_ingestion::Chunk`: adds catalog identity, the owning
/// KB, the vector it was upserted as, and the enable/disable flag the reconciler and the
/// vector index's `FilteredQuery` both honor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub kb_id: KbId,
    pub ordinal: u32,
    pub content: String,
    pub element_path: Vec<usize>,
    pub token_count: usize,
    pub char_count: usize,
    pub metadata: ChunkMetadata,
    pub vector_id: ChunkId,
    pub enabled: bool,
}

impl ChunkRecord {
    pub fn from_ingestion(document_id: DocumentId, kb_id: KbId, chunk: &IngestionChunk) -> Self {
        let id = ChunkId::new();
        Self {
            id,
            document_id,
            kb_id,
            ordinal: chunk.ordinal,
            content: chunk.content.clone(),
            element_path: chunk.element_path.clone(),
            token_count: chunk.token_count,
            char_count: chunk.char_count,
            metadata: chunk.metadata.clone(),
            vector_id: id,
            enabled: true,
        }
    }
}

/// A page of full content preserved at preview time, returned verbatim by
/// `list_pages`/`get_page` (not a chunk view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub uri: String,
    pub title: Option<String>,
    pub heading_count: usize,
    pub table_count: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub heading_count: usize,
    pub table_count: usize,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePreview {
    pub pages: Vec<Page>,
    pub sample_chunks: Vec<IngestionChunk>,
    pub stats: DocumentStats,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewBundle {
    pub per_source: HashMap<SourceId, SourcePreview>,
}

/// TTL-bounded authoring state. Independent of any KB until `finalize` hands it off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: DraftId,
    pub workspace_id: WorkspaceId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub kb_spec: KbSpec,
    pub sources: Vec<Source>,
    pub chunking_overrides: HashMap<SourceId, ChunkingConfig>,
    pub preview: Option<PreviewBundle>,
    pub finalized: bool,
}

impl Draft {
    pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;
    pub const MAX_TTL_SECS: i64 = 7 * 24 * 60 * 60;

    pub fn new(workspace_id: WorkspaceId, created_by: UserId, kb_spec: KbSpec) -> Self {
        let now = Utc::now();
        Self {
            draft_id: DraftId::new(),
            workspace_id,
            created_by,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(Self::DEFAULT_TTL_SECS),
            kb_spec,
            sources: Vec::new(),
            chunking_overrides: HashMap::new(),
            preview: None,
            finalized: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Resolves `source_id`'s effective chunking config: its override, else the KB spec's
    /// default, else the crate default.
    pub fn resolved_chunking(&self, source_id: SourceId) -> ChunkingConfig {
        self.chunking_overrides
            .get(&source_id)
            .cloned()
            .or_else(|| self.kb_spec.default_chunking.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub total: u64,
    pub active: u64,
    pub by_status: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkCounts {
    pub total: u64,
    pub enabled: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub documents: DocumentCounts,
    pub chunks: ChunkCounts,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_default_ttl_is_24h() {
        let draft = Draft::new(WorkspaceId::new(), UserId::new(), KbSpec::default());
        let ttl = draft.expires_at - draft.created_at;
        assert_eq!(ttl.num_seconds(), Draft::DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_document_status_active_set() {
        assert!(DocumentStatus::Indexed.is_active());
        assert!(DocumentStatus::Pending.is_active());
        assert!(!DocumentStatus::Failed.is_active());
        assert!(!DocumentStatus::Disabled.is_active());
    }

    #[test]
    fn test_resolved_chunking_prefers_source_override() {
        let mut draft = Draft::new(WorkspaceId::new(), UserId::new(), KbSpec::default());
        let source_id = SourceId::new();
        let override_cfg = ChunkingConfig::default().with_target_size(500);
        draft.chunking_overrides.insert(source_id, override_cfg.clone());
        assert_eq!(draft.resolved_chunking(source_id).target_size, 500);
        assert_eq!(draft.resolved_chunking(SourceId::new()).target_size, 1000);
    }
}
