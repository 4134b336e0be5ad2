//! Concrete `StageHandler`s wiring the orchestrator to real work (C7).
//!
//! Each handler covers exactly one `PipelineStage` and hands its output to the
//! next stage through `ExecutionContext::artifacts`, keyed by source id:
//! ingest fetches raw bytes, parse structures them, chunk splits the
//! structure, embed vectorizes the chunks, index upserts them and marks the
//! document (and, once every document in the KB is terminal, the KB itself)
//! done. None of these hold state across runs -- everything they need for one
//! source comes from the `SourcePlan` the run was started with.

use async_trait::async_trait;
use kb_adapters::VecSink;
use kb_core::model::{RawDocument, StructuredDocument};
use kb_core::types::{DocumentId, KbId, WorkspaceId};
use kb_index::{EmbedContext, Embedder, VectorIndex, VectorPayload, VectorRecord};
use kb_ingestion::{ChunkingConfig, ParserRegistry, TextChunker};
use kb_workflow::{ExecutionContext, SourcePlan, StageHandler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{mark_kb_status, CatalogRepository};
use crate::draft::AdapterRegistry;
use crate::model::{ChunkRecord, DocumentStatus, KbStatus};

fn workspace_id(context: &ExecutionContext) -> Result<WorkspaceId, String> {
    let raw = context
        .variables
        .get("workspace_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "missing workspace_id in execution context".to_string())?;
    raw.parse().map_err(|err| format!("invalid workspace_id: {err}"))
}

fn kb_id(context: &ExecutionContext) -> Result<KbId, String> {
    context.workflow_id.parse().map_err(|err| format!("invalid kb id: {err}"))
}

fn lookup_source(context: &ExecutionContext, source_id: &str) -> Result<SourcePlan, String> {
    let sources = context
        .variables
        .get("sources")
        .ok_or_else(|| "missing sources in execution context".to_string())?;
    let plans: Vec<SourcePlan> =
        serde_json::from_value(sources.clone()).map_err(|err| format!("malformed sources: {err}"))?;
    plans
        .into_iter()
        .find(|plan| plan.source_id == source_id)
        .ok_or_else(|| format!("no source plan registered for source {source_id}"))
}

async fn take_artifact<T: for<'de> Deserialize<'de>>(
    context: &ExecutionContext,
    source_id: &str,
    stage: &str,
) -> Result<T, String> {
    let value = context
        .take_artifact(source_id)
        .await
        .ok_or_else(|| format!("no {stage} artifact left for source {source_id}"))?;
    serde_json::from_value(value).map_err(|err| format!("malformed {stage} artifact: {err}"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IngestArtifact {
    documents: Vec<RawDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParseArtifact {
    documents: Vec<RawDocument>,
    structured: Vec<StructuredDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkArtifact {
    records: Vec<ChunkRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbedArtifact {
    records: Vec<ChunkRecord>,
    vectors: Vec<Vec<f32>>,
}

/// Fetches a source's raw documents through its adapter. The only handler
/// that reads `SourcePlan.reference`/`config` -- everything downstream only
/// sees what this stage left behind.
pub struct IngestHandler {
    adapters: Arc<AdapterRegistry>,
}

impl IngestHandler {
    pub fn new(adapters: Arc<AdapterRegistry>) -> Self {
        Self { adapters }
    }
}

#[async_trait]
impl StageHandler for IngestHandler {
    async fn run(&self, source_id: &str, context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
        let plan = lookup_source(context, source_id)?;
        let adapter = self.adapters.get(&plan.kind.to_string()).map_err(|err| err.to_string())?;
        adapter
            .validate(&plan.reference, &plan.config)
            .map_err(|err| err.to_string())?;

        let mut sink = VecSink::default();
        adapter
            .fetch(&plan.reference, &plan.config, &mut sink, None)
            .await
            .map_err(|err| err.to_string())?;

        let documents: Vec<RawDocument> = sink.documents.into_iter().map(|(doc, _checkpoint)| doc).collect();
        if documents.is_empty() {
            return Err(format!("adapter fetched no documents for source {source_id}"));
        }

        let fetched = documents.len();
        let artifact = IngestArtifact { documents };
        let value = serde_json::to_value(&artifact).map_err(|err| err.to_string())?;
        context.set_artifact(source_id, value).await;
        Ok(Some(serde_json::json!({ "documents_fetched": fetched })))
    }
}

/// Parses each fetched document into its structural element tree and records
/// the catalog document's title/checksum from the first page.
pub struct ParseHandler {
    parsers: Arc<ParserRegistry>,
    catalog: Arc<dyn CatalogRepository>,
}

impl ParseHandler {
    pub fn new(parsers: Arc<ParserRegistry>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { parsers, catalog }
    }
}

#[async_trait]
impl StageHandler for ParseHandler {
    async fn run(&self, source_id: &str, context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
        let plan = lookup_source(context, source_id)?;
        let workspace_id = workspace_id(context)?;
        let document_id: DocumentId = plan.document_id.parse().map_err(|err| format!("invalid document id: {err}"))?;
        let ingest: IngestArtifact = take_artifact(context, source_id, "ingest").await?;

        let mut structured = Vec::with_capacity(ingest.documents.len());
        let mut errors = Vec::new();
        for raw in &ingest.documents {
            match self.parsers.parse(raw).await {
                Ok(doc) => structured.push(doc),
                Err(err) => errors.push(err.to_string()),
            }
        }
        if structured.is_empty() {
            return Err(format!("no documents parsed for source {source_id}: {}", errors.join("; ")));
        }

        let mut document = self
            .catalog
            .get_document(workspace_id, document_id)
            .await
            .map_err(|err| err.to_string())?;
        document.status = DocumentStatus::Chunking;
        if document.title.is_none() {
            document.title = structured.iter().find_map(|doc| doc.title.clone());
        }
        if let Some(first) = ingest.documents.first() {
            document.checksum = first.checksum.clone();
        }
        document.updated_at = chrono::Utc::now();
        self.catalog.put_document(workspace_id, document).await.map_err(|err| err.to_string())?;

        let parsed = structured.len();
        let artifact = ParseArtifact { documents: ingest.documents, structured };
        let value = serde_json::to_value(&artifact).map_err(|err| err.to_string())?;
        context.set_artifact(source_id, value).await;
        Ok(Some(serde_json::json!({ "documents_parsed": parsed })))
    }
}

/// Splits each parsed document into chunks under the source's resolved
/// chunking config and persists them immediately, so the embed/index stages
/// only ever need the `ChunkRecord`s, not the structural tree.
pub struct ChunkHandler {
    catalog: Arc<dyn CatalogRepository>,
}

impl ChunkHandler {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl StageHandler for ChunkHandler {
    async fn run(&self, source_id: &str, context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
        let plan = lookup_source(context, source_id)?;
        let workspace_id = workspace_id(context)?;
        let kb_id = kb_id(context)?;
        let document_id: DocumentId = plan.document_id.parse().map_err(|err| format!("invalid document id: {err}"))?;
        let parsed: ParseArtifact = take_artifact(context, source_id, "parse").await?;

        let config: ChunkingConfig = if plan.chunking.is_null() {
            ChunkingConfig::default()
        } else {
            serde_json::from_value(plan.chunking).map_err(|err| format!("invalid chunking config: {err}"))?
        };
        let chunker = TextChunker::new(config).map_err(|err| err.to_string())?;

        let mut records = Vec::new();
        for structured in &parsed.structured {
            let chunks = chunker
                .chunk(&document_id.to_string(), structured)
                .await
                .map_err(|err| err.to_string())?;
            for chunk in &chunks {
                records.push(ChunkRecord::from_ingestion(document_id, kb_id, chunk));
            }
        }

        for record in &records {
            self.catalog.put_chunk(workspace_id, record.clone()).await.map_err(|err| err.to_string())?;
        }

        let mut document = self
            .catalog
            .get_document(workspace_id, document_id)
            .await
            .map_err(|err| err.to_string())?;
        document.status = DocumentStatus::Embedding;
        document.chunk_count = records.len();
        document.updated_at = chrono::Utc::now();
        self.catalog.put_document(workspace_id, document).await.map_err(|err| err.to_string())?;

        let created = records.len();
        let artifact = ChunkArtifact { records };
        let value = serde_json::to_value(&artifact).map_err(|err| err.to_string())?;
        context.set_artifact(source_id, value).await;
        Ok(Some(serde_json::json!({ "chunks_created": created })))
    }
}

/// Embeds every chunk's content in batches sized to the embedder's own limit.
pub struct EmbedHandler {
    embedder: Arc<dyn Embedder>,
}

impl EmbedHandler {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl StageHandler for EmbedHandler {
    async fn run(&self, source_id: &str, context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
        let workspace_id = workspace_id(context)?;
        let kb_id = kb_id(context)?;
        let chunked: ChunkArtifact = take_artifact(context, source_id, "chunk").await?;

        let embed_ctx = EmbedContext { kb_id, workspace_id };
        let mut vectors = Vec::with_capacity(chunked.records.len());
        for batch in chunked.records.chunks(self.embedder.batch_size().max(1)) {
            let texts: Vec<String> = batch.iter().map(|record| record.content.clone()).collect();
            let batch_vectors = self.embedder.embed(&texts, embed_ctx).await.map_err(|err| err.to_string())?;
            vectors.extend(batch_vectors);
        }
        if vectors.len() != chunked.records.len() {
            return Err(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunked.records.len()
            ));
        }

        let embedded = chunked.records.len();
        let artifact = EmbedArtifact { records: chunked.records, vectors };
        let value = serde_json::to_value(&artifact).map_err(|err| err.to_string())?;
        context.set_artifact(source_id, value).await;
        Ok(Some(serde_json::json!({ "chunks_embedded": embedded })))
    }
}

/// Upserts every chunk's vector, updates the document's terminal counters,
/// and promotes the KB to `ready` (or `failed`) once every document in it has
/// reached a terminal status.
pub struct IndexHandler {
    catalog: Arc<dyn CatalogRepository>,
    index: Arc<dyn VectorIndex>,
}

impl IndexHandler {
    pub fn new(catalog: Arc<dyn CatalogRepository>, index: Arc<dyn VectorIndex>) -> Self {
        Self { catalog, index }
    }

    async fn kb_is_done(&self, workspace_id: WorkspaceId, kb_id: KbId) -> Result<Option<KbStatus>, String> {
        let documents = self.catalog.list_documents(workspace_id, kb_id).await.map_err(|err| err.to_string())?;
        if documents.is_empty() || !documents.iter().all(|doc| matches!(doc.status, DocumentStatus::Indexed | DocumentStatus::Failed)) {
            return Ok(None);
        }
        let any_failed = documents.iter().any(|doc| doc.status == DocumentStatus::Failed);
        Ok(Some(if any_failed { KbStatus::Failed } else { KbStatus::Ready }))
    }
}

#[async_trait]
impl StageHandler for IndexHandler {
    async fn run(&self, source_id: &str, context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
        let plan = lookup_source(context, source_id)?;
        let workspace_id = workspace_id(context)?;
        let kb_id = kb_id(context)?;
        let document_id: DocumentId = plan.document_id.parse().map_err(|err| format!("invalid document id: {err}"))?;
        let embedded: EmbedArtifact = take_artifact(context, source_id, "embed").await?;

        let records: Vec<VectorRecord> = embedded
            .records
            .iter()
            .zip(embedded.vectors.iter())
            .map(|(record, vector)| VectorRecord {
                vector_id: record.vector_id,
                vector: vector.clone(),
                payload: VectorPayload {
                    kb_id,
                    workspace_id,
                    document_id: record.document_id,
                    chunk_id: record.id,
                    ordinal: record.ordinal,
                    enabled: record.enabled,
                },
            })
            .collect();
        let indexed = records.len();
        self.index.upsert(kb_id, records).await.map_err(|err| err.to_string())?;

        let mut document = self
            .catalog
            .get_document(workspace_id, document_id)
            .await
            .map_err(|err| err.to_string())?;
        document.status = DocumentStatus::Indexed;
        document.chunk_count = embedded.records.len();
        document.word_count = embedded.records.iter().map(|r| r.content.split_whitespace().count()).sum();
        document.char_count = embedded.records.iter().map(|r| r.char_count).sum();
        document.updated_at = chrono::Utc::now();
        self.catalog.put_document(workspace_id, document).await.map_err(|err| err.to_string())?;

        if let Some(status) = self.kb_is_done(workspace_id, kb_id).await? {
            mark_kb_status(&self.catalog, workspace_id, kb_id, status)
                .await
                .map_err(|err| err.to_string())?;
        }

        Ok(Some(serde_json::json!({ "vectors_indexed": indexed })))
    }
}
