//! The `text` adapter: the reference *is* the content, no external I/O.

use crate::traits::{RawDocumentSink, SourceAdapter};
use crate::{AdapterError, AdapterResult};
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};
use kb_core::types::SourceId;

const MAX_TEXT_BYTES: usize = 5 * 1024 * 1024;

pub struct TextAdapter;

impl TextAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for TextAdapter {
    fn validate(&self, reference: &serde_json::Value, _config: &serde_json::Value) -> AdapterResult<()> {
        let text = reference
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("text reference requires a text field".into()))?;
        if text.len() > MAX_TEXT_BYTES {
            return Err(AdapterError::InvalidArgument(format!(
                "text payload ({} bytes) exceeds cap of {MAX_TEXT_BYTES} bytes",
                text.len()
            )));
        }
        Ok(())
    }

    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult> {
        let text = reference.get("text").and_then(|v| v.as_str()).unwrap_or("");
        Ok(ProbeResult {
            estimated_pages: Some(1),
            estimated_bytes: Some(text.len() as u64),
            content_kind: "text/plain".into(),
        })
    }

    async fn fetch(
        &self,
        reference: &serde_json::Value,
        config: &serde_json::Value,
        sink: &mut dyn RawDocumentSink,
        _resume_from: Option<CheckpointToken>,
    ) -> AdapterResult<()> {
        self.validate(reference, config)?;
        let text = reference.get("text").and_then(|v| v.as_str()).unwrap();
        let source_id: SourceId = reference
            .get("source_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let external_id = reference
            .get("external_id")
            .and_then(|v| v.as_str())
            .unwrap_or("inline")
            .to_string();
        let doc = RawDocument::new(source_id, external_id, "text://inline", "text/plain", text.as_bytes().to_vec());
        sink.push(doc, CheckpointToken("done".into())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_produces_one_document() {
        let adapter = TextAdapter::new();
        let mut sink = crate::traits::VecSink::default();
        let reference = serde_json::json!({ "text": "hello" });
        adapter.fetch(&reference, &serde_json::json!({}), &mut sink, None).await.unwrap();
        assert_eq!(sink.documents.len(), 1);
        assert_eq!(sink.documents[0].0.bytes, b"hello");
    }

    #[test]
    fn test_validate_rejects_oversized_payload() {
        let adapter = TextAdapter::new();
        let text = "a".repeat(MAX_TEXT_BYTES + 1);
        let reference = serde_json::json!({ "text": text });
        assert!(adapter.validate(&reference, &serde_json::Value::Null).is_err());
    }
}
