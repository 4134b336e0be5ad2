//! The `composite` adapter: no external I/O, concatenates children's fetch output into
//! a single RawDocument in declared order. Nesting depth is capped at 2.

use crate::traits::{RawDocumentSink, SourceAdapter, VecSink};
use crate::{AdapterError, AdapterResult};
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};
use kb_core::types::SourceId;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_NESTING_DEPTH: u32 = 2;

/// Delegates to a registry of adapters keyed by kind, so a composite source can
/// reference web/file/cloud/text children (and, up to `MAX_NESTING_DEPTH`, other
/// composites) without this crate depending on the orchestrator's adapter wiring.
pub struct CompositeAdapter {
    children: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl CompositeAdapter {
    pub fn new(children: HashMap<String, Arc<dyn SourceAdapter>>) -> Self {
        Self { children }
    }

    fn child_adapter(&self, kind: &str) -> AdapterResult<Arc<dyn SourceAdapter>> {
        self.children
            .get(kind)
            .cloned()
            .ok_or_else(|| AdapterError::InvalidArgument(format!("no adapter registered for child kind {kind}")))
    }

    fn depth_of(reference: &serde_json::Value) -> u32 {
        reference.get("composite_depth").and_then(|v| v.as_u64()).unwrap_or(0) as u32
    }
}

#[async_trait]
impl SourceAdapter for CompositeAdapter {
    fn validate(&self, reference: &serde_json::Value, _config: &serde_json::Value) -> AdapterResult<()> {
        let depth = Self::depth_of(reference);
        if depth >= MAX_NESTING_DEPTH {
            return Err(AdapterError::InvalidArgument(format!(
                "composite nesting depth {depth} exceeds max of {MAX_NESTING_DEPTH}"
            )));
        }
        let children = reference
            .get("children")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AdapterError::InvalidArgument("composite reference requires a children array".into()))?;
        if children.is_empty() {
            return Err(AdapterError::InvalidArgument("composite reference requires at least one child".into()));
        }
        for child in children {
            let kind = child
                .get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AdapterError::InvalidArgument("composite child requires a kind".into()))?;
            let adapter = self.child_adapter(kind)?;
            let child_ref = child.get("reference").cloned().unwrap_or(serde_json::Value::Null);
            let child_config = child.get("config").cloned().unwrap_or(serde_json::Value::Null);
            adapter.validate(&child_ref, &child_config)?;
        }
        Ok(())
    }

    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult> {
        let children = reference
            .get("children")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AdapterError::InvalidArgument("composite reference requires a children array".into()))?;
        let mut total_bytes = 0u64;
        let mut pages = 0u32;
        for child in children {
            let kind = child.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
            if let Ok(adapter) = self.child_adapter(kind) {
                let child_ref = child.get("reference").cloned().unwrap_or(serde_json::Value::Null);
                if let Ok(probe) = adapter.probe(&child_ref).await {
                    total_bytes += probe.estimated_bytes.unwrap_or(0);
                    pages += probe.estimated_pages.unwrap_or(1);
                }
            }
        }
        Ok(ProbeResult {
            estimated_pages: Some(pages),
            estimated_bytes: Some(total_bytes),
            content_kind: "application/x-composite".into(),
        })
    }

    async fn fetch(
        &self,
        reference: &serde_json::Value,
        _config: &serde_json::Value,
        sink: &mut dyn RawDocumentSink,
        _resume_from: Option<CheckpointToken>,
    ) -> AdapterResult<()> {
        self.validate(reference, &serde_json::Value::Null)?;
        let depth = Self::depth_of(reference);
        let source_id: SourceId = reference
            .get("source_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let children = reference.get("children").and_then(|v| v.as_array()).unwrap();

        let mut combined = Vec::new();
        let mut boundaries = Vec::new();
        let mut mime = "text/plain".to_string();

        for (i, child) in children.iter().enumerate() {
            let kind = child.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
            let adapter = self.child_adapter(kind)?;
            let mut child_ref = child.get("reference").cloned().unwrap_or(serde_json::Value::Null);
            if kind == "composite" {
                if let Some(obj) = child_ref.as_object_mut() {
                    obj.insert("composite_depth".into(), serde_json::json!(depth + 1));
                }
            }
            let child_config = child.get("config").cloned().unwrap_or(serde_json::Value::Null);

            let mut child_sink = VecSink::default();
            adapter.fetch(&child_ref, &child_config, &mut child_sink, None).await?;

            for (doc, _) in child_sink.documents {
                let start = combined.len();
                combined.extend_from_slice(&doc.bytes);
                boundaries.push(serde_json::json!({
                    "child_index": i,
                    "kind": kind,
                    "start": start,
                    "end": combined.len(),
                    "uri": doc.uri,
                }));
                if i == 0 {
                    mime = doc.mime;
                }
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert("composite_boundaries".to_string(), serde_json::json!(boundaries));

        let doc = RawDocument::new(source_id, "composite", "composite://concatenated", mime, combined)
            .with_metadata(metadata);
        sink.push(doc, CheckpointToken("done".into())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextAdapter;

    fn registry() -> HashMap<String, Arc<dyn SourceAdapter>> {
        let mut m: HashMap<String, Arc<dyn SourceAdapter>> = HashMap::new();
        m.insert("text".to_string(), Arc::new(TextAdapter::new()));
        m
    }

    #[test]
    fn test_validate_rejects_empty_children() {
        let adapter = CompositeAdapter::new(registry());
        let reference = serde_json::json!({ "children": [] });
        assert!(adapter.validate(&reference, &serde_json::Value::Null).is_err());
    }

    #[test]
    fn test_validate_rejects_depth_exceeded() {
        let adapter = CompositeAdapter::new(registry());
        let reference = serde_json::json!({
            "composite_depth": 2,
            "children": [{ "kind": "text", "reference": { "text": "a" } }]
        });
        assert!(adapter.validate(&reference, &serde_json::Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_fetch_concatenates_children_in_order() {
        let adapter = CompositeAdapter::new(registry());
        let reference = serde_json::json!({
            "children": [
                { "kind": "text", "reference": { "text": "AAA" } },
                { "kind": "text", "reference": { "text": "BBB" } },
            ]
        });
        let mut sink = VecSink::default();
        adapter.fetch(&reference, &serde_json::Value::Null, &mut sink, None).await.unwrap();
        assert_eq!(sink.documents.len(), 1);
        assert_eq!(sink.documents[0].0.bytes, b"AAABBB");
        let boundaries = sink.documents[0].0.metadata.get("composite_boundaries").unwrap();
        assert_eq!(boundaries.as_array().unwrap().len(), 2);
    }
}
