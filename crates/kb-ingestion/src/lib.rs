//! Parser and chunker crate for the knowledge base ETL pipeline.
//!
//! Turns a [`kb_core::model::RawDocument`] into ordered chunk payloads ready for embedding:
//!
//! - structure-preserving parsing per mime family (HTML, Markdown, JSON-as-data, code,
//!   generic text), never collapsing a document into one blob
//! - a cleaning pass (whitespace, control characters, adjacent-duplicate elements)
//! - nine chunking strategies over the resulting element tree

pub mod chunking;
pub mod cleaning;
pub mod parser;
pub mod pipeline;

pub use chunking::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy, SentenceEmbedder, TextChunker};
pub use cleaning::clean_document;
pub use parser::{
    CodeParser, GenericTextParser, HtmlParser, JsonParser, MarkdownParser, Parser, ParserError,
    ParserRegistry, ParserResult,
};
pub use pipeline::{IngestionPipeline, IngestionResult, PipelineConfig, PipelineStats};

/// Error types for ingestion operations
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Chunking failed: {0}")]
    ChunkingFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Duplicate document: {0}")]
    DuplicateDocument(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestionError::UnsupportedType("application/octet-stream".to_string());
        assert!(err.to_string().contains("Unsupported document type"));
    }
}
