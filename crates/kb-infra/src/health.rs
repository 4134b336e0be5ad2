//! Dependency health checks, aggregated behind `kb_core::traits::HealthCheck`.

use async_trait::async_trait;
use kb_core::traits::{HealthCheck, HealthStatus};
use sqlx::PgPool;
use std::sync::Arc;

pub struct DatabaseHealthCheck {
    pool: PgPool,
}

impl DatabaseHealthCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheck for DatabaseHealthCheck {
    async fn check(&self) -> HealthStatus {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    fn name(&self) -> &str {
        "database"
    }
}

pub struct RedisHealthCheck {
    client: redis::Client,
}

impl RedisHealthCheck {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthCheck for RedisHealthCheck {
    async fn check(&self) -> HealthStatus {
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                Ok(_) => HealthStatus::Healthy,
                Err(e) => HealthStatus::Degraded(e.to_string()),
            },
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// Aggregates several dependency checks into one overall status. A single unhealthy dependency
/// makes the composite unhealthy; a degraded one without an unhealthy peer makes it degraded.
pub struct CompositeHealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl CompositeHealthChecker {
    pub fn new(checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self { checks }
    }

    pub async fn check_all(&self) -> Vec<(String, HealthStatus)> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            results.push((check.name().to_string(), check.check().await));
        }
        results
    }

    pub async fn overall(&self) -> HealthStatus {
        let results = self.check_all().await;
        let mut degraded = None;

        for (name, status) in results {
            match status {
                HealthStatus::Unhealthy(reason) => {
                    return HealthStatus::Unhealthy(format!("{name}: {reason}"))
                }
                HealthStatus::Degraded(reason) => degraded = Some(format!("{name}: {reason}")),
                HealthStatus::Healthy => {}
            }
        }

        degraded.map(HealthStatus::Degraded).unwrap_or(HealthStatus::Healthy)
    }
}
