//! Quota management for tenants
//!
//! Provides resource quota enforcement and tracking for the pipeline's concurrency and storage
//! limits (§5 of the design).

use crate::{Result, Tenant, TenantError, TenantTier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Quota type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    /// Concurrently running pipeline runs for a workspace.
    ConcurrentRuns,
    /// Chunks stored in a single knowledge base.
    ChunksPerKb,
    /// Total vectors across all knowledge bases in a workspace.
    TotalVectors,
    /// Open drafts for a workspace.
    DraftsPerWorkspace,
    /// Total storage in bytes.
    Storage,
    /// Number of users in the workspace.
    Users,
}

impl QuotaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConcurrentRuns => "concurrent_runs",
            Self::ChunksPerKb => "chunks_per_kb",
            Self::TotalVectors => "total_vectors",
            Self::DraftsPerWorkspace => "drafts_per_workspace",
            Self::Storage => "storage",
            Self::Users => "users",
        }
    }
}

/// Quota limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub limit: u64,
    pub warning_threshold: f64,
    pub hard_limit: bool,
}

impl QuotaLimit {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            warning_threshold: 0.8,
            hard_limit: true,
        }
    }

    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_soft_limit(mut self) -> Self {
        self.hard_limit = false;
        self
    }
}

/// Quota usage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub quota_type: QuotaType,
    pub current: u64,
    pub limit: u64,
    pub percentage: f64,
    pub exceeded: bool,
    pub warning: bool,
}

impl QuotaUsage {
    pub fn new(quota_type: QuotaType, current: u64, limit: u64) -> Self {
        let percentage = if limit > 0 {
            (current as f64 / limit as f64) * 100.0
        } else {
            0.0
        };

        Self {
            quota_type,
            current,
            limit,
            percentage,
            exceeded: current > limit,
            warning: percentage >= 80.0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current)
    }
}

/// Per-tenant quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuotas {
    pub limits: HashMap<QuotaType, QuotaLimit>,
}

impl TenantQuotas {
    /// Default quotas for a tier, per `TenantTier`'s `default_*_limit` methods.
    pub fn for_tier(tier: TenantTier) -> Self {
        let mut limits = HashMap::new();

        limits.insert(QuotaType::ConcurrentRuns, QuotaLimit::new(tier.default_concurrent_runs_limit()));
        limits.insert(QuotaType::ChunksPerKb, QuotaLimit::new(tier.default_chunks_per_kb_limit()));
        limits.insert(QuotaType::TotalVectors, QuotaLimit::new(tier.default_total_vectors_limit()));
        limits.insert(
            QuotaType::DraftsPerWorkspace,
            QuotaLimit::new(tier.default_drafts_per_workspace_limit()),
        );
        limits.insert(QuotaType::Storage, QuotaLimit::new(tier.default_storage_limit()));
        limits.insert(QuotaType::Users, QuotaLimit::new(50));

        Self { limits }
    }

    pub fn get_limit(&self, quota_type: &QuotaType) -> Option<u64> {
        self.limits.get(quota_type).map(|l| l.limit)
    }

    pub fn set_limit(&mut self, quota_type: QuotaType, limit: QuotaLimit) {
        self.limits.insert(quota_type, limit);
    }
}

/// Quota manager for tracking and enforcing quotas, keyed by tenant (workspace) id.
pub struct QuotaManager {
    usage: Arc<RwLock<HashMap<String, HashMap<QuotaType, u64>>>>,
    quotas: Arc<RwLock<HashMap<String, TenantQuotas>>>,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaManager {
    pub fn new() -> Self {
        Self {
            usage: Arc::new(RwLock::new(HashMap::new())),
            quotas: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register_tenant(&self, tenant: &Tenant) {
        let quotas = TenantQuotas::for_tier(tenant.tier);
        self.quotas.write().insert(tenant.id.clone(), quotas);
        self.usage.write().insert(tenant.id.clone(), HashMap::new());
        debug!(tenant_id = %tenant.id, tier = ?tenant.tier, "Registered tenant quotas");
    }

    pub fn remove_tenant(&self, tenant_id: &str) {
        self.quotas.write().remove(tenant_id);
        self.usage.write().remove(tenant_id);
        debug!(tenant_id = %tenant_id, "Removed tenant quotas");
    }

    pub fn get_usage(&self, tenant_id: &str, quota_type: QuotaType) -> Option<QuotaUsage> {
        let usage = self.usage.read();
        let quotas = self.quotas.read();

        let current = usage.get(tenant_id)?.get(&quota_type).copied().unwrap_or(0);
        let limit = quotas.get(tenant_id)?.get_limit(&quota_type).unwrap_or(0);

        Some(QuotaUsage::new(quota_type, current, limit))
    }

    pub fn get_all_usage(&self, tenant_id: &str) -> HashMap<QuotaType, QuotaUsage> {
        let usage = self.usage.read();
        let quotas = self.quotas.read();

        let mut result = HashMap::new();

        if let Some(tenant_quotas) = quotas.get(tenant_id) {
            let tenant_usage = usage.get(tenant_id);

            for (quota_type, limit) in &tenant_quotas.limits {
                let current = tenant_usage.and_then(|u| u.get(quota_type)).copied().unwrap_or(0);
                result.insert(*quota_type, QuotaUsage::new(*quota_type, current, limit.limit));
            }
        }

        result
    }

    /// Check whether incrementing `quota_type` by `amount` would breach its limit.
    pub fn check_quota(&self, tenant_id: &str, quota_type: QuotaType, amount: u64) -> Result<()> {
        let usage = self.usage.read();
        let quotas = self.quotas.read();

        let tenant_quotas = quotas
            .get(tenant_id)
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

        let limit = tenant_quotas.limits.get(&quota_type).ok_or_else(|| {
            TenantError::InvalidConfiguration(format!("No limit configured for {:?}", quota_type))
        })?;

        let current = usage.get(tenant_id).and_then(|u| u.get(&quota_type)).copied().unwrap_or(0);
        let new_total = current + amount;

        if new_total > limit.limit && limit.hard_limit {
            return Err(TenantError::QuotaExceeded(format!(
                "{:?} quota exceeded: {} + {} > {}",
                quota_type, current, amount, limit.limit
            )));
        }

        if new_total as f64 / limit.limit as f64 >= limit.warning_threshold {
            warn!(
                tenant_id = %tenant_id,
                quota_type = ?quota_type,
                current = current,
                amount = amount,
                limit = limit.limit,
                "Quota warning threshold reached"
            );
        }

        Ok(())
    }

    pub fn increment(&self, tenant_id: &str, quota_type: QuotaType, amount: u64) -> Result<u64> {
        self.check_quota(tenant_id, quota_type, amount)?;

        let mut usage = self.usage.write();
        let tenant_usage = usage.entry(tenant_id.to_string()).or_default();
        let current = tenant_usage.entry(quota_type).or_insert(0);
        *current += amount;

        debug!(
            tenant_id = %tenant_id,
            quota_type = ?quota_type,
            amount = amount,
            new_total = *current,
            "Incremented quota usage"
        );

        Ok(*current)
    }

    pub fn decrement(&self, tenant_id: &str, quota_type: QuotaType, amount: u64) -> u64 {
        let mut usage = self.usage.write();
        let tenant_usage = usage.entry(tenant_id.to_string()).or_default();
        let current = tenant_usage.entry(quota_type).or_insert(0);
        *current = current.saturating_sub(amount);

        debug!(
            tenant_id = %tenant_id,
            quota_type = ?quota_type,
            amount = amount,
            new_total = *current,
            "Decremented quota usage"
        );

        *current
    }

    pub fn set_usage(&self, tenant_id: &str, quota_type: QuotaType, amount: u64) {
        let mut usage = self.usage.write();
        let tenant_usage = usage.entry(tenant_id.to_string()).or_default();
        tenant_usage.insert(quota_type, amount);
    }

    pub fn update_tier(&self, tenant_id: &str, tier: TenantTier) {
        let quotas = TenantQuotas::for_tier(tier);
        self.quotas.write().insert(tenant_id.to_string(), quotas);
        debug!(tenant_id = %tenant_id, tier = ?tier, "Updated tenant tier quotas");
    }

    pub fn set_custom_limit(&self, tenant_id: &str, quota_type: QuotaType, limit: u64) {
        let mut quotas = self.quotas.write();
        if let Some(tenant_quotas) = quotas.get_mut(tenant_id) {
            tenant_quotas.set_limit(quota_type, QuotaLimit::new(limit));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tenant() -> Tenant {
        Tenant::new("Test", "test", "owner", TenantTier::Professional)
    }

    #[test]
    fn test_quota_usage() {
        let usage = QuotaUsage::new(QuotaType::ChunksPerKb, 800, 1000);

        assert_eq!(usage.current, 800);
        assert_eq!(usage.percentage, 80.0);
        assert!(!usage.exceeded);
        assert!(usage.warning);
        assert_eq!(usage.remaining(), 200);
    }

    #[test]
    fn test_quota_exceeded() {
        let usage = QuotaUsage::new(QuotaType::TotalVectors, 1200, 1000);

        assert!(usage.exceeded);
        assert_eq!(usage.remaining(), 0);
    }

    #[test]
    fn test_tenant_quotas_for_tier() {
        let free_quotas = TenantQuotas::for_tier(TenantTier::Free);
        let enterprise_quotas = TenantQuotas::for_tier(TenantTier::Enterprise);

        assert!(
            free_quotas.get_limit(&QuotaType::TotalVectors).unwrap()
                < enterprise_quotas.get_limit(&QuotaType::TotalVectors).unwrap()
        );
    }

    #[test]
    fn test_quota_manager_basic() {
        let manager = QuotaManager::new();
        let tenant = create_test_tenant();

        manager.register_tenant(&tenant);

        let usage = manager.get_usage(&tenant.id, QuotaType::ConcurrentRuns).unwrap();
        assert_eq!(usage.current, 0);

        manager.increment(&tenant.id, QuotaType::ConcurrentRuns, 1).unwrap();
        let usage = manager.get_usage(&tenant.id, QuotaType::ConcurrentRuns).unwrap();
        assert_eq!(usage.current, 1);

        manager.decrement(&tenant.id, QuotaType::ConcurrentRuns, 1);
        let usage = manager.get_usage(&tenant.id, QuotaType::ConcurrentRuns).unwrap();
        assert_eq!(usage.current, 0);
    }

    #[test]
    fn test_quota_enforcement() {
        let manager = QuotaManager::new();
        let tenant = Tenant::new("Test", "test", "owner", TenantTier::Free);

        manager.register_tenant(&tenant);
        manager.set_custom_limit(&tenant.id, QuotaType::DraftsPerWorkspace, 100);

        assert!(manager.check_quota(&tenant.id, QuotaType::DraftsPerWorkspace, 50).is_ok());

        manager.set_usage(&tenant.id, QuotaType::DraftsPerWorkspace, 90);

        assert!(manager.check_quota(&tenant.id, QuotaType::DraftsPerWorkspace, 20).is_err());
    }

    #[test]
    fn test_get_all_usage() {
        let manager = QuotaManager::new();
        let tenant = create_test_tenant();

        manager.register_tenant(&tenant);
        manager.increment(&tenant.id, QuotaType::ChunksPerKb, 100).unwrap();
        manager.increment(&tenant.id, QuotaType::Users, 3).unwrap();

        let all_usage = manager.get_all_usage(&tenant.id);

        assert!(all_usage.contains_key(&QuotaType::ChunksPerKb));
        assert!(all_usage.contains_key(&QuotaType::Users));
        assert!(all_usage.contains_key(&QuotaType::Storage));
    }
}
