//! Wires the parser, cleaner and chunker into one call: a [`RawDocument`] in, an ordered
//! list of [`Chunk`] payloads out, with size guards and per-run stats.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use kb_core::model::RawDocument;

use crate::chunking::{Chunk, ChunkingConfig, TextChunker};
use crate::cleaning::clean_document;
use crate::parser::{ParserError, ParserRegistry};
use crate::{IngestionError, Result};

impl From<ParserError> for IngestionError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::UnsupportedMime(mime) => IngestionError::UnsupportedType(mime),
            other => IngestionError::ExtractionFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    pub title: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    /// Documents larger than this are rejected before parsing even starts.
    pub max_document_size: usize,
    /// When true, a single document's failure aborts `ingest_batch`'s remaining work.
    pub strict_mode: bool,
    /// Max documents processed concurrently by `ingest_batch`.
    pub parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            max_document_size: 50 * 1024 * 1024,
            strict_mode: false,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub documents_ingested: AtomicU64,
    pub documents_failed: AtomicU64,
    pub chunks_produced: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.documents_ingested.load(Ordering::Relaxed),
            self.documents_failed.load(Ordering::Relaxed),
            self.chunks_produced.load(Ordering::Relaxed),
        )
    }
}

/// Parses, cleans and chunks [`RawDocument`]s. One instance is shared across a tenant's
/// ingestion run; `ingest_batch` fans documents out under a bounded semaphore rather than
/// one task per document with no cap.
pub struct IngestionPipeline {
    registry: Arc<ParserRegistry>,
    chunker: Arc<TextChunker>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl IngestionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let chunker = TextChunker::new(config.chunking.clone())?;
        Ok(Self {
            registry: Arc::new(ParserRegistry::with_defaults()),
            chunker: Arc::new(chunker),
            config,
            stats: Arc::new(PipelineStats::default()),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default())
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub async fn ingest(&self, document: &RawDocument) -> Result<IngestionResult> {
        if document.bytes.len() > self.config.max_document_size {
            self.stats.documents_failed.fetch_add(1, Ordering::Relaxed);
            return Err(IngestionError::ValidationError(format!(
                "document {} exceeds max size of {} bytes",
                document.external_id, self.config.max_document_size
            )));
        }

        debug!(external_id = %document.external_id, mime = %document.mime, "parsing document");
        let mut structured = match self.registry.parse(document).await {
            Ok(doc) => doc,
            Err(err) => {
                self.stats.documents_failed.fetch_add(1, Ordering::Relaxed);
                return Err(err.into());
            }
        };

        clean_document(&mut structured);

        let document_id = document.checksum.clone();
        let chunks = match self.chunker.chunk(&document_id, &structured).await {
            Ok(chunks) => chunks,
            Err(err) => {
                self.stats.documents_failed.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        self.stats.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.stats.chunks_produced.fetch_add(chunks.len() as u64, Ordering::Relaxed);
        info!(external_id = %document.external_id, chunk_count = chunks.len(), "document ingested");

        Ok(IngestionResult {
            document_id,
            chunks,
            title: structured.title,
            language: structured.language,
        })
    }

    pub async fn ingest_batch(&self, documents: Vec<RawDocument>) -> Result<Vec<IngestionResult>> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            let chunker = self.chunker.clone();
            let stats = self.stats.clone();
            let max_size = self.config.max_document_size;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                ingest_one(&registry, &chunker, &stats, max_size, document).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => {
                    if self.config.strict_mode {
                        return Err(err);
                    }
                    warn!(error = %err, "document failed in batch; continuing");
                }
                Err(join_err) => {
                    if self.config.strict_mode {
                        return Err(IngestionError::PipelineError(join_err.to_string()));
                    }
                    warn!(error = %join_err, "ingestion task panicked; continuing");
                }
            }
        }
        Ok(results)
    }
}

async fn ingest_one(
    registry: &ParserRegistry,
    chunker: &TextChunker,
    stats: &PipelineStats,
    max_size: usize,
    document: RawDocument,
) -> Result<IngestionResult> {
    if document.bytes.len() > max_size {
        stats.documents_failed.fetch_add(1, Ordering::Relaxed);
        return Err(IngestionError::ValidationError(format!(
            "document {} exceeds max size of {} bytes",
            document.external_id, max_size
        )));
    }

    let mut structured = registry.parse(&document).await.map_err(|err| {
        stats.documents_failed.fetch_add(1, Ordering::Relaxed);
        IngestionError::from(err)
    })?;
    clean_document(&mut structured);

    let document_id = document.checksum.clone();
    let chunks = chunker.chunk(&document_id, &structured).await.map_err(|err| {
        stats.documents_failed.fetch_add(1, Ordering::Relaxed);
        err
    })?;

    stats.documents_ingested.fetch_add(1, Ordering::Relaxed);
    stats.chunks_produced.fetch_add(chunks.len() as u64, Ordering::Relaxed);

    Ok(IngestionResult {
        document_id,
        chunks,
        title: structured.title,
        language: structured.language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::SourceId;

    fn doc(mime: &str, bytes: &[u8]) -> RawDocument {
        RawDocument::new(SourceId::new(), "ext-1", "https://example.com", mime, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_ingest_markdown_produces_chunks() {
        let pipeline = IngestionPipeline::with_defaults().unwrap();
        let text = "# Title\n\nFirst paragraph of real content here.\n\nSecond paragraph follows.\n";
        let result = pipeline.ingest(&doc("text/markdown", text.as_bytes())).await.unwrap();
        assert!(!result.chunks.is_empty());
        assert_eq!(result.title.as_deref(), Some("Title"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_oversized_document() {
        let config = PipelineConfig { max_document_size: 10, ..PipelineConfig::default() };
        let pipeline = IngestionPipeline::new(config).unwrap();
        let err = pipeline.ingest(&doc("text/plain", b"this is definitely over ten bytes")).await.unwrap_err();
        assert!(matches!(err, IngestionError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_ingest_rejects_opaque_mime() {
        let pipeline = IngestionPipeline::with_defaults().unwrap();
        let err = pipeline.ingest(&doc("application/pdf", b"%PDF-1.4")).await.unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_ingest_batch_reports_all_results() {
        let pipeline = IngestionPipeline::with_defaults().unwrap();
        let docs = vec![
            doc("text/plain", b"First document body text."),
            doc("text/plain", b"Second document body text."),
        ];
        let results = pipeline.ingest_batch(docs).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_batch_skips_failures_when_not_strict() {
        let pipeline = IngestionPipeline::with_defaults().unwrap();
        let docs = vec![doc("text/plain", b"Fine document."), doc("application/pdf", b"%PDF-1.4")];
        let results = pipeline.ingest_batch(docs).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_track_ingested_documents() {
        let pipeline = IngestionPipeline::with_defaults().unwrap();
        pipeline.ingest(&doc("text/plain", b"Some content here.")).await.unwrap();
        let (ingested, failed, chunks) = pipeline.stats().snapshot();
        assert_eq!(ingested, 1);
        assert_eq!(failed, 0);
        assert!(chunks > 0);
    }
}
