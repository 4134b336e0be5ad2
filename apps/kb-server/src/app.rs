//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kb_catalog::catalog::InMemoryCatalogRepository;
use kb_catalog::draft::{spawn_ttl_sweeper, AdapterRegistry, InMemoryDraftRepository};
use kb_catalog::{
    CatalogRepository, ChunkHandler, DraftService, EmbedHandler, IndexHandler, IngestHandler,
    ParseHandler, Reconciler,
};
use kb_index::{Embedder, HashingEmbedder, InMemoryVectorIndex, VectorIndex};
use kb_ingestion::ParserRegistry;
use kb_workflow::{DefaultStepExecutor, PipelineStage, WorkflowEngine};

use crate::cli::Args;
use crate::server::Server;

/// Default cadence for the draft store's own TTL sweep (SPEC_FULL.md SS4.1: must be
/// at most 60s, well inside the reconciler's slower 5-minute backstop pass).
const DRAFT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state. Every handler reaches the catalog and draft store only
/// through these Arc'd services, never by constructing its own repository.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<kb_core::AppConfig>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub index: Arc<dyn VectorIndex>,
    pub engine: Arc<WorkflowEngine>,
    pub drafts: Arc<DraftService<InMemoryDraftRepository>>,
    pub draft_repo: Arc<InMemoryDraftRepository>,
    pub reconciler: Arc<Reconciler<InMemoryDraftRepository>>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state with all dependencies, and spawn its background
    /// sweepers. `shutdown` is cloned into every spawned task so `App::run` can stop
    /// them together on SIGINT/SIGTERM.
    pub async fn new(config: kb_core::AppConfig) -> Result<Self> {
        info!("initializing application components");

        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let quotas = Arc::new(kb_tenant::quota::QuotaManager::new());
        let draft_repo = Arc::new(InMemoryDraftRepository::new());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let parsers = Arc::new(ParserRegistry::with_defaults());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(config.embedding.dimension));

        let executor = DefaultStepExecutor::new()
            .with_handler(PipelineStage::Ingest, Arc::new(IngestHandler::new(adapters.clone())))
            .with_handler(PipelineStage::Parse, Arc::new(ParseHandler::new(parsers, catalog.clone())))
            .with_handler(PipelineStage::Chunk, Arc::new(ChunkHandler::new(catalog.clone())))
            .with_handler(PipelineStage::Embed, Arc::new(EmbedHandler::new(embedder)))
            .with_handler(PipelineStage::Index, Arc::new(IndexHandler::new(catalog.clone(), index.clone())));
        let engine = Arc::new(WorkflowEngine::with_executor(Arc::new(executor)).with_quotas(quotas.clone()));

        let drafts = Arc::new(
            DraftService::new(draft_repo.clone(), catalog.clone(), adapters, engine.clone()).with_quotas(quotas.clone()),
        );
        let reconciler = Arc::new(Reconciler::new(catalog.clone(), index.clone(), draft_repo.clone()));

        let shutdown = CancellationToken::new();
        spawn_ttl_sweeper(draft_repo.clone(), DRAFT_SWEEP_INTERVAL, Some(quotas.clone()));
        reconciler.clone().spawn(shutdown.clone());

        Ok(Self {
            config: Arc::new(config),
            catalog,
            index,
            engine,
            drafts,
            draft_repo,
            reconciler,
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Main application
pub struct App {
    args: Args,
    state: AppState,
}

impl App {
    /// Build the application with all dependencies
    pub async fn build(args: Args) -> Result<Self> {
        args.validate().context("invalid command line arguments")?;

        let config = kb_core::AppConfig::load_from_file(&args.config.to_string_lossy())
            .or_else(|_| kb_core::AppConfig::load())
            .context("failed to load configuration")?;

        let state = AppState::new(config).await?;

        Ok(Self { args, state })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        info!("starting server");
        info!(port = self.args.port, "http port");

        let shutdown = self.state.shutdown_token();
        let server = Server::new(self.args, self.state)?;
        let result = server.run().await;
        shutdown.cancel();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_creation() {
        let config = kb_core::AppConfig::load().expect("defaults should be sufficient to build a config");
        let result = AppState::new(config).await;
        assert!(result.is_ok());
    }
}
