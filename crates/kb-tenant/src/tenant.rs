//! The `Tenant` entity: the workspace-level isolation boundary. One `Tenant` owns one database
//! schema and one vector-store namespace; every `KnowledgeBase`, `Draft`, and `PipelineRun` is
//! scoped to exactly one tenant.

use chrono::{DateTime, Utc};
use kb_core::types::{Timestamps, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Pending,
    Suspended,
    Disabled,
    Deleted,
}

impl TenantStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, TenantStatus::Active)
    }
}

/// Service tier. Determines default quota limits (see `crate::quota::TenantQuotas::for_tier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    Free,
    Starter,
    Professional,
    Business,
    Enterprise,
    Custom,
}

impl TenantTier {
    pub fn default_concurrent_runs_limit(&self) -> u64 {
        match self {
            Self::Free => 1,
            Self::Starter => 2,
            Self::Professional => 5,
            Self::Business => 15,
            Self::Enterprise | Self::Custom => u64::MAX,
        }
    }

    pub fn default_chunks_per_kb_limit(&self) -> u64 {
        match self {
            Self::Free => 5_000,
            Self::Starter => 50_000,
            Self::Professional => 500_000,
            Self::Business => 5_000_000,
            Self::Enterprise | Self::Custom => u64::MAX,
        }
    }

    pub fn default_total_vectors_limit(&self) -> u64 {
        match self {
            Self::Free => 10_000,
            Self::Starter => 100_000,
            Self::Professional => 1_000_000,
            Self::Business => 10_000_000,
            Self::Enterprise | Self::Custom => u64::MAX,
        }
    }

    pub fn default_drafts_per_workspace_limit(&self) -> u64 {
        match self {
            Self::Free => 3,
            Self::Starter => 10,
            Self::Professional => 50,
            Self::Business => 200,
            Self::Enterprise | Self::Custom => u64::MAX,
        }
    }

    pub fn default_storage_limit(&self) -> u64 {
        match self {
            Self::Free => 1_000_000_000,
            Self::Starter => 10_000_000_000,
            Self::Professional => 100_000_000_000,
            Self::Business => 1_000_000_000_000,
            Self::Enterprise | Self::Custom => u64::MAX,
        }
    }
}

/// The tenant entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub status: TenantStatus,
    pub tier: TenantTier,
    pub owner_id: String,
    /// Postgres schema holding this tenant's tables.
    pub schema_name: String,
    /// Vector-store namespace holding this tenant's embeddings.
    pub vector_namespace: String,
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Tenant {
    pub fn new(name: &str, slug: &str, owner_id: &str, tier: TenantTier) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let normalized_slug = slug.to_lowercase().replace(['-', ' '], "_");

        Self {
            id: id.clone(),
            name: name.to_string(),
            slug: slug.to_string(),
            status: TenantStatus::Active,
            tier,
            owner_id: owner_id.to_string(),
            schema_name: format!("tenant_{normalized_slug}"),
            vector_namespace: format!("ns_{id}"),
            trial_ends_at: None,
            metadata: HashMap::new(),
            timestamps: Timestamps::now(),
        }
    }

    pub fn new_trial(name: &str, slug: &str, owner_id: &str, trial_days: i64) -> Self {
        let mut tenant = Self::new(name, slug, owner_id, TenantTier::Starter);
        tenant.status = TenantStatus::Pending;
        tenant.trial_ends_at = Some(Utc::now() + chrono::Duration::days(trial_days));
        tenant
    }

    pub fn workspace_id(&self) -> Result<WorkspaceId, uuid::Error> {
        Ok(WorkspaceId::from_uuid(uuid::Uuid::parse_str(&self.id)?))
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    pub fn is_trial(&self) -> bool {
        self.trial_ends_at.is_some()
    }

    pub fn is_trial_expired(&self) -> bool {
        self.trial_ends_at.map(|t| t < Utc::now()).unwrap_or(false)
    }

    pub fn activate(&mut self) {
        self.status = TenantStatus::Active;
        self.timestamps.touch();
    }

    pub fn suspend(&mut self) {
        self.status = TenantStatus::Suspended;
        self.timestamps.touch();
    }

    pub fn disable(&mut self) {
        self.status = TenantStatus::Disabled;
        self.timestamps.touch();
    }

    pub fn mark_for_deletion(&mut self) {
        self.status = TenantStatus::Deleted;
        self.timestamps.touch();
    }

    pub fn upgrade_tier(&mut self, tier: TenantTier) {
        self.tier = tier;
        self.timestamps.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_creation() {
        let tenant = Tenant::new("Acme Corp", "acme-corp", "owner-1", TenantTier::Professional);

        assert_eq!(tenant.name, "Acme Corp");
        assert_eq!(tenant.schema_name, "tenant_acme_corp");
        assert!(tenant.vector_namespace.starts_with("ns_"));
        assert!(tenant.is_operational());
    }

    #[test]
    fn test_trial_tenant() {
        let tenant = Tenant::new_trial("Trial Co", "trial-co", "owner-2", 14);

        assert!(tenant.is_trial());
        assert!(!tenant.is_trial_expired());
        assert_eq!(tenant.status, TenantStatus::Pending);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut tenant = Tenant::new("Test", "test", "owner", TenantTier::Free);

        tenant.suspend();
        assert_eq!(tenant.status, TenantStatus::Suspended);
        assert!(!tenant.is_operational());

        tenant.activate();
        assert!(tenant.is_operational());

        tenant.disable();
        assert_eq!(tenant.status, TenantStatus::Disabled);
    }

    #[test]
    fn test_tier_upgrade() {
        let mut tenant = Tenant::new("Test", "test", "owner", TenantTier::Free);
        tenant.upgrade_tier(TenantTier::Business);
        assert_eq!(tenant.tier, TenantTier::Business);
    }

    #[test]
    fn test_tier_quota_ordering() {
        assert!(
            TenantTier::Free.default_total_vectors_limit()
                < TenantTier::Enterprise.default_total_vectors_limit()
        );
    }
}
