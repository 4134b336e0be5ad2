//! Transient document shapes shared between the source adapters and the parser/chunker
//! pipeline. Nothing here is persisted as-is; it is the handoff format between C3, C4 and C5.

use crate::types::SourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of a source, shared by the adapter and catalog layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    File,
    Cloud,
    Text,
    Composite,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Web => "web",
            Self::File => "file",
            Self::Cloud => "cloud",
            Self::Text => "text",
            Self::Composite => "composite",
        };
        write!(f, "{s}")
    }
}

/// A checkpoint token an adapter can resume `fetch` from. Opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CheckpointToken(pub String);

/// What an adapter produces for one unit of content, before any parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub source_id: SourceId,
    pub external_id: String,
    pub uri: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub checksum: String,
    /// Adapter-specific extras, e.g. a composite source's child byte-range boundaries.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawDocument {
    pub fn new(
        source_id: SourceId,
        external_id: impl Into<String>,
        uri: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let checksum = checksum_of(&bytes);
        Self {
            source_id,
            external_id: external_id.into(),
            uri: uri.into(),
            mime: mime.into(),
            bytes,
            fetched_at: chrono::Utc::now(),
            checksum,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// sha256 hex digest, used as the document checksum and the dedup key at catalog scope.
pub fn checksum_of(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Result of a cheap `probe` call, used by preview pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub estimated_pages: Option<u32>,
    pub estimated_bytes: Option<u64>,
    pub content_kind: String,
}

/// One element in a structured document's tree. Structural metadata is carried on the
/// variant itself rather than flattened away, per the no-lossy-flattening contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
        style_runs: Vec<StyleRun>,
    },
    ListItem {
        depth: u32,
        text: String,
    },
    Table {
        rows: Vec<Vec<TableCell>>,
    },
    CodeBlock {
        language: Option<String>,
        text: String,
    },
    ImageRef {
        uri: String,
        caption: Option<String>,
        ocr_text: Option<String>,
    },
    Figure {
        caption: Option<String>,
        contents: Vec<Element>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRun {
    pub start: u32,
    pub end: u32,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub col_span: u32,
    pub row_span: u32,
}

/// An ordered tree of elements produced by the parser, with document-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub source_id: SourceId,
    pub title: Option<String>,
    pub elements: Vec<Element>,
    pub language: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StructuredDocument {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            title: None,
            elements: Vec::new(),
            language: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        let a = checksum_of(b"hello");
        let b = checksum_of(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, checksum_of(b"world"));
    }

    #[test]
    fn test_raw_document_checksum_matches_bytes() {
        let doc = RawDocument::new(SourceId::new(), "ext-1", "https://example.com", "text/plain", b"hi".to_vec());
        assert_eq!(doc.checksum, checksum_of(b"hi"));
    }

    #[test]
    fn test_source_kind_display() {
        assert_eq!(SourceKind::Web.to_string(), "web");
        assert_eq!(SourceKind::Composite.to_string(), "composite");
    }
}
