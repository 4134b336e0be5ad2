use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration, loaded once at process start and handed out as an `Arc`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub embedding: EmbeddingConfig,
    pub adapters: AdaptersConfig,
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables under the `KB` prefix.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("KB")
    }

    /// Load configuration from environment with a custom prefix.
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("database.url", "postgres://localhost/kb_etl")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.url", "redis://localhost")?
            .set_default("redis.max_connections", 10)?
            .set_default("embedding.provider", "local-hash")?
            .set_default("embedding.model", "local-hash-v1")?
            .set_default("embedding.dimension", 384)?
            .set_default("embedding.batch_size", 32)?
            .set_default("embedding.api_key", "")?
            .set_default("adapters.max_attempts", 5)?
            .set_default("adapters.initial_backoff_ms", 500)?
            .set_default("adapters.max_backoff_ms", 30_000)?
            .set_default("adapters.fetch_timeout_ms", 30_000)?
            .set_default("orchestrator.max_concurrent_runs_per_workspace", 3)?
            .set_default("orchestrator.max_concurrent_sources_per_run", 4)?
            .set_default("orchestrator.draft_ttl_seconds", 86_400)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a file with environment overrides layered on top.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("KB").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }

    pub fn with_pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

/// Redis configuration, used for the draft-store cache and reconciler coordination.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
}

impl RedisConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: default_redis_max_connections(),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

fn default_redis_max_connections() -> u32 {
    10
}

/// Embedding provider configuration. `dimension` and `provider`/`model` together form a KB's
/// immutable embedding profile once the first vector is written.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl EmbeddingConfig {
    pub fn new(provider: String, model: String, dimension: usize) -> Self {
        Self {
            provider,
            model,
            dimension,
            batch_size: default_embedding_batch_size(),
            api_key: String::new(),
            base_url: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = api_key;
        self
    }
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_embedding_batch_size() -> usize {
    32
}

/// Source adapter configuration: retry/backoff and fetch-timeout policy shared by every adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct AdaptersConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl AdaptersConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

/// Orchestrator concurrency and lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_runs_per_workspace")]
    pub max_concurrent_runs_per_workspace: usize,
    #[serde(default = "default_max_sources_per_run")]
    pub max_concurrent_sources_per_run: usize,
    #[serde(default = "default_draft_ttl_seconds")]
    pub draft_ttl_seconds: u64,
}

impl OrchestratorConfig {
    pub fn draft_ttl(&self) -> Duration {
        Duration::from_secs(self.draft_ttl_seconds)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs_per_workspace: default_max_runs_per_workspace(),
            max_concurrent_sources_per_run: default_max_sources_per_run(),
            draft_ttl_seconds: default_draft_ttl_seconds(),
        }
    }
}

fn default_max_runs_per_workspace() -> usize {
    3
}

fn default_max_sources_per_run() -> usize {
    4
}

fn default_draft_ttl_seconds() -> u64 {
    86_400
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tls(mut self, cert_path: String, key_path: String) -> Self {
        self.tls_cert_path = Some(cert_path);
        self.tls_key_path = Some(key_path);
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "kb-etl-pipeline".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_creation() {
        let config = DatabaseConfig::new("postgres://localhost".to_string()).with_pool_size(5, 20);

        assert_eq!(config.url, "postgres://localhost");
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_redis_config_creation() {
        let config = RedisConfig::new("redis://localhost".to_string()).with_max_connections(15);

        assert_eq!(config.url, "redis://localhost");
        assert_eq!(config.max_connections, 15);
    }

    #[test]
    fn test_embedding_config_creation() {
        let config = EmbeddingConfig::new("local-hash".to_string(), "local-hash-v1".to_string(), 384)
            .with_batch_size(64);

        assert_eq!(config.provider, "local-hash");
        assert_eq!(config.dimension, 384);
        assert_eq!(config.batch_size, 64);
    }

    #[test]
    fn test_adapters_config_defaults() {
        let config = AdaptersConfig::default();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.max_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_orchestrator_config_defaults() {
        let config = OrchestratorConfig::default();

        assert_eq!(config.max_concurrent_runs_per_workspace, 3);
        assert_eq!(config.draft_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_server_config_creation() {
        let config = ServerConfig::new()
            .with_host("127.0.0.1".to_string())
            .with_port(3000)
            .with_workers(8);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.workers, 8);
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.workers > 0);
    }

    #[test]
    fn test_server_tls_config() {
        let config = ServerConfig::new().with_tls(
            "/path/to/cert.pem".to_string(),
            "/path/to/key.pem".to_string(),
        );

        assert!(config.is_tls_enabled());
        assert_eq!(config.tls_cert_path, Some("/path/to/cert.pem".to_string()));
        assert_eq!(config.tls_key_path, Some("/path/to/key.pem".to_string()));
    }
}
