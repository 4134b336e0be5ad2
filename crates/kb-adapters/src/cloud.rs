//! The `cloud` adapter: documents/sheets/pages living in a third-party workspace,
//! reached through a stored credential.

use crate::traits::{RawDocumentSink, SourceAdapter};
use crate::{AdapterError, AdapterResult};
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};
use kb_core::types::SourceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    GDocs,
    GSheets,
    Notion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub provider: CloudProvider,
}

/// Resolves a stored `credential_id` to a usable access token for a provider call.
/// Credential storage/rotation is out of this crate's scope; this is the seam the
/// orchestrator's credential store is wired in through.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, credential_id: &str) -> AdapterResult<String>;
}

/// A credential store that always fails to resolve. Used where no real credential
/// store is wired in yet; callers get a clear `Forbidden` rather than a silent stub.
pub struct UnconfiguredCredentialStore;

#[async_trait]
impl CredentialStore for UnconfiguredCredentialStore {
    async fn resolve(&self, credential_id: &str) -> AdapterResult<String> {
        Err(AdapterError::Forbidden(format!(
            "no credential store configured to resolve {credential_id}"
        )))
    }
}

/// Enumerates and fetches documents from a third-party workspace provider.
pub struct CloudAdapter {
    credentials: std::sync::Arc<dyn CredentialStore>,
}

impl CloudAdapter {
    pub fn new(credentials: std::sync::Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SourceAdapter for CloudAdapter {
    fn validate(&self, reference: &serde_json::Value, _config: &serde_json::Value) -> AdapterResult<()> {
        let provider = reference
            .get("provider")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("cloud reference requires a provider".into()))?;
        if !matches!(provider, "gdocs" | "gsheets" | "notion") {
            return Err(AdapterError::InvalidArgument(format!("unknown cloud provider {provider}")));
        }
        reference
            .get("resource_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("cloud reference requires a resource_id".into()))?;
        reference
            .get("credential_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("cloud reference requires a credential_id".into()))?;
        Ok(())
    }

    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult> {
        let credential_id = reference
            .get("credential_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("cloud reference requires a credential_id".into()))?;
        self.credentials.resolve(credential_id).await?;
        Ok(ProbeResult {
            estimated_pages: None,
            estimated_bytes: None,
            content_kind: "application/vnd.cloud-document".into(),
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
        let credential_id = reference.get("credential_id").and_then(|v| v.as_str()).unwrap();
        let resource_id = reference.get("resource_id").and_then(|v| v.as_str()).unwrap();
        let provider = reference.get("provider").and_then(|v| v.as_str()).unwrap();
        let source_id: SourceId = reference
            .get("source_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let _token = self.credentials.resolve(credential_id).await?;

        let _ = sink;
        // Provider RPCs are not wired in yet: every cloud provider integration is a
        // distinct third-party API surface with its own auth dance and is tracked as
        // follow-up work, not a silent no-op (see DESIGN.md).
        Err(AdapterError::Internal(format!(
            "cloud provider {provider} ({resource_id}) fetch is not yet implemented"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let adapter = CloudAdapter::new(std::sync::Arc::new(UnconfiguredCredentialStore));
        let reference = serde_json::json!({ "provider": "dropbox", "resource_id": "r1", "credential_id": "c1" });
        assert!(adapter.validate(&reference, &serde_json::Value::Null).is_err());
    }

    #[test]
    fn test_validate_requires_all_fields() {
        let adapter = CloudAdapter::new(std::sync::Arc::new(UnconfiguredCredentialStore));
        let reference = serde_json::json!({ "provider": "gdocs" });
        assert!(adapter.validate(&reference, &serde_json::Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_probe_surfaces_credential_failure() {
        let adapter = CloudAdapter::new(std::sync::Arc::new(UnconfiguredCredentialStore));
        let reference = serde_json::json!({ "provider": "gdocs", "resource_id": "r1", "credential_id": "missing" });
        let err = adapter.probe(&reference).await.unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::Forbidden);
    }
}
