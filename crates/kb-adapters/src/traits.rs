//! The uniform capability set every source adapter exposes.

use crate::AdapterResult;
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};

/// Push interface a `fetch` call feeds raw documents into, one at a time, each paired
/// with a checkpoint token the caller can persist and resume from later.
#[async_trait]
pub trait RawDocumentSink: Send + Sync {
    async fn push(&mut self, document: RawDocument, checkpoint: CheckpointToken) -> AdapterResult<()>;
}

/// An in-memory sink, used by tests and by the preview path which wants the full list.
#[derive(Default)]
pub struct VecSink {
    pub documents: Vec<(RawDocument, CheckpointToken)>,
}

#[async_trait]
impl RawDocumentSink for VecSink {
    async fn push(&mut self, document: RawDocument, checkpoint: CheckpointToken) -> AdapterResult<()> {
        self.documents.push((document, checkpoint));
        Ok(())
    }
}

/// One adapter per `SourceKind`. `reference` and `config` are adapter-specific JSON payloads;
/// each adapter is responsible for deserializing and validating its own shape.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Cheap syntactic + semantic validation of a reference/config pair before any I/O.
    fn validate(&self, reference: &serde_json::Value, config: &serde_json::Value) -> AdapterResult<()>;

    /// Cheap size/shape estimate, used for preview pacing. Must not perform a full fetch.
    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult>;

    /// Produce a finite, restartable sequence of RawDocuments into `sink`.
    async fn fetch(
        &self,
        reference: &serde_json::Value,
        config: &serde_json::Value,
        sink: &mut dyn RawDocumentSink,
        resume_from: Option<CheckpointToken>,
    ) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::SourceId;

    #[tokio::test]
    async fn test_vec_sink_push() {
        let mut sink = VecSink::default();
        let doc = RawDocument::new(SourceId::new(), "e1", "uri", "text/plain", b"hi".to_vec());
        sink.push(doc, CheckpointToken("0".into())).await.unwrap();
        assert_eq!(sink.documents.len(), 1);
    }
}
