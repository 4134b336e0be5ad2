//! The TTL-bounded authoring surface a knowledge base goes through before it exists (C6).
//!
//! A draft accumulates sources and chunking overrides, can be previewed against the real
//! adapters and ingestion pipeline without touching the catalog, and `finalize` is the
//! only operation that turns it into a durable `KnowledgeBase` plus a queued
//! `PipelineRun`. Draft identity is namespaced `draft:{workspace_id}:{draft_id}`, the same
//! `scoped_key` convention `kb_core::types::TenantContext` uses for every per-workspace
//! key, so a future `redis`-backed `DraftRepository` just needs that string as its key.

use crate::catalog::CatalogRepository;
use crate::model::{
    Draft, KbSpec, Page, PreviewBundle, Source, SourcePatch, SourcePreview, SourceSpec,
};
use crate::{DraftError, DraftResult};
use async_trait::async_trait;
use dashmap::DashMap;
use kb_adapters::{
    cloud::UnconfiguredCredentialStore, CloudAdapter, CompositeAdapter, FileAdapter, SourceAdapter,
    TextAdapter, VecSink, WebAdapter,
};
use kb_core::model::Element;
use kb_core::types::{DraftId, SourceId, TenantContext, WorkspaceId};
use kb_ingestion::{ParserRegistry, TextChunker};
use kb_workflow::{PipelineRunPlan, SourcePlan, WorkflowEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Namespaced draft key, `draft:{workspace_id}:{draft_id}` (SPEC_FULL.md SS4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub workspace_id: WorkspaceId,
    pub draft_id: DraftId,
}

impl DraftKey {
    pub fn new(workspace_id: WorkspaceId, draft_id: DraftId) -> Self {
        Self { workspace_id, draft_id }
    }
}

impl std::fmt::Display for DraftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "draft:{}:{}", self.workspace_id, self.draft_id)
    }
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn get(&self, key: DraftKey) -> DraftResult<Draft>;
    async fn put(&self, draft: Draft) -> DraftResult<()>;
    async fn delete(&self, key: DraftKey) -> DraftResult<()>;
    async fn list_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<DraftKey>;

    /// Atomically removes and returns the draft, so two concurrent callers can
    /// never both observe it present: exactly one gets `Ok`, the other gets
    /// `NotFound`. `finalize` claims the draft this way before creating
    /// anything, so a second `finalize(draft_id)` call fails instead of
    /// racing a second KB into existence.
    async fn claim(&self, key: DraftKey) -> DraftResult<Draft>;
}

#[derive(Default)]
pub struct InMemoryDraftRepository {
    drafts: DashMap<String, Draft>,
}

impl InMemoryDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftRepository for InMemoryDraftRepository {
    async fn get(&self, key: DraftKey) -> DraftResult<Draft> {
        self.drafts
            .get(&key.to_string())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DraftError::NotFound(key.to_string()))
    }

    async fn put(&self, draft: Draft) -> DraftResult<()> {
        let key = DraftKey::new(draft.workspace_id, draft.draft_id);
        self.drafts.insert(key.to_string(), draft);
        Ok(())
    }

    async fn delete(&self, key: DraftKey) -> DraftResult<()> {
        self.drafts.remove(&key.to_string());
        Ok(())
    }

    async fn list_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<DraftKey> {
        self.drafts
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| DraftKey::new(entry.value().workspace_id, entry.value().draft_id))
            .collect()
    }

    async fn claim(&self, key: DraftKey) -> DraftResult<Draft> {
        self.drafts
            .remove(&key.to_string())
            .map(|(_, draft)| draft)
            .ok_or_else(|| DraftError::NotFound(key.to_string()))
    }
}

/// Adapter registry keyed by `SourceKind`'s wire tag, wired the same way
/// `CompositeAdapter`'s own tests wire a child registry.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn with_defaults() -> Self {
        let mut adapters: HashMap<String, Arc<dyn SourceAdapter>> = HashMap::new();
        adapters.insert("web".to_string(), Arc::new(WebAdapter::new()));
        adapters.insert("file".to_string(), Arc::new(FileAdapter::new()));
        adapters.insert("text".to_string(), Arc::new(TextAdapter::new()));
        adapters.insert(
            "cloud".to_string(),
            Arc::new(CloudAdapter::new(Arc::new(UnconfiguredCredentialStore))),
        );
        let composite = Arc::new(CompositeAdapter::new(adapters.clone()));
        adapters.insert("composite".to_string(), composite);
        Self { adapters }
    }

    pub fn get(&self, kind: &str) -> DraftResult<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(kind)
            .cloned()
            .ok_or_else(|| DraftError::InvalidArgument(format!("no adapter registered for kind {kind}")))
    }
}

/// Bound on `preview`'s per-source output (SPEC_FULL.md SS4.1).
const PREVIEW_MAX_PAGES: usize = 10;
const PREVIEW_MAX_CHUNKS: usize = 50;

/// Counts headings and tables in a parsed element tree, recursing into
/// figures the same way `kb_ingestion::cleaning::clean_element` does.
fn count_headings_and_tables(elements: &[Element]) -> (usize, usize) {
    let mut headings = 0;
    let mut tables = 0;
    for element in elements {
        match element {
            Element::Heading { .. } => headings += 1,
            Element::Table { .. } => tables += 1,
            Element::Figure { contents, .. } => {
                let (nested_headings, nested_tables) = count_headings_and_tables(contents);
                headings += nested_headings;
                tables += nested_tables;
            }
            _ => {}
        }
    }
    (headings, tables)
}

pub struct DraftService<R: DraftRepository> {
    repo: Arc<R>,
    catalog: Arc<dyn CatalogRepository>,
    adapters: Arc<AdapterRegistry>,
    engine: Arc<WorkflowEngine>,
    quotas: Option<Arc<kb_tenant::quota::QuotaManager>>,
}

impl<R: DraftRepository> DraftService<R> {
    pub fn new(
        repo: Arc<R>,
        catalog: Arc<dyn CatalogRepository>,
        adapters: Arc<AdapterRegistry>,
        engine: Arc<WorkflowEngine>,
    ) -> Self {
        Self { repo, catalog, adapters, engine, quotas: None }
    }

    /// Enforces SPEC_FULL.md SS5's `DraftsPerWorkspace` admission. A workspace with no
    /// registered quotas is auto-provisioned at `TenantTier::Professional` on first use,
    /// mirroring `kb_workflow::WorkflowEngine::with_quotas` -- there's no separate
    /// tenant-onboarding surface here either.
    pub fn with_quotas(mut self, quotas: Arc<kb_tenant::quota::QuotaManager>) -> Self {
        self.quotas = Some(quotas);
        self
    }

    fn ensure_registered(quotas: &kb_tenant::quota::QuotaManager, workspace_id: &str) {
        if quotas.get_usage(workspace_id, kb_tenant::quota::QuotaType::DraftsPerWorkspace).is_none() {
            let tenant = kb_tenant::Tenant {
                id: workspace_id.to_string(),
                ..kb_tenant::Tenant::new(workspace_id, workspace_id, "system", kb_tenant::TenantTier::Professional)
            };
            quotas.register_tenant(&tenant);
        }
    }

    fn check_access(ctx: &TenantContext, draft: &Draft) -> DraftResult<()> {
        if draft.workspace_id != ctx.workspace_id {
            return Err(DraftError::NotFound(draft.draft_id.to_string()));
        }
        let is_owner = draft.created_by == ctx.user_id;
        let is_admin = ctx.role.satisfies(kb_core::types::Role::Admin);
        if !is_owner && !is_admin {
            return Err(DraftError::NotFound(draft.draft_id.to_string()));
        }
        Ok(())
    }

    async fn load_live(&self, ctx: &TenantContext, draft_id: DraftId) -> DraftResult<Draft> {
        let key = DraftKey::new(ctx.workspace_id, draft_id);
        let draft = self.repo.get(key).await?;
        Self::check_access(ctx, &draft)?;
        if draft.is_expired(chrono::Utc::now()) {
            return Err(DraftError::ExpiredDraft(draft_id.to_string()));
        }
        Ok(draft)
    }

    pub async fn create_draft(&self, ctx: &TenantContext, kb_spec: KbSpec) -> DraftResult<Draft> {
        if let Some(quotas) = &self.quotas {
            let workspace_id = ctx.workspace_id.to_string();
            Self::ensure_registered(quotas, &workspace_id);
            quotas
                .increment(&workspace_id, kb_tenant::quota::QuotaType::DraftsPerWorkspace, 1)
                .map_err(|err| DraftError::QuotaExceeded(err.to_string()))?;
        }

        let draft = Draft::new(ctx.workspace_id, ctx.user_id, kb_spec);
        self.repo.put(draft.clone()).await?;
        info!(draft_id = %draft.draft_id, workspace_id = %ctx.workspace_id, "draft created");
        Ok(draft)
    }

    fn release_draft_quota(&self, workspace_id: kb_core::types::WorkspaceId) {
        if let Some(quotas) = &self.quotas {
            quotas.decrement(&workspace_id.to_string(), kb_tenant::quota::QuotaType::DraftsPerWorkspace, 1);
        }
    }

    pub async fn add_source(
        &self,
        ctx: &TenantContext,
        draft_id: DraftId,
        spec: SourceSpec,
    ) -> DraftResult<Source> {
        let mut draft = self.load_live(ctx, draft_id).await?;
        let adapter = self.adapters.get(&spec.kind.to_string())?;
        adapter
            .validate(&spec.reference, &spec.config)
            .map_err(|err| DraftError::InvalidArgument(err.to_string()))?;

        let source = Source {
            id: SourceId::new(),
            kb_id: kb_core::types::KbId::default(),
            kind: spec.kind,
            reference: spec.reference,
            config: spec.config,
            annotations: spec.annotations,
        };
        draft.sources.push(source.clone());
        draft.preview = None;
        self.repo.put(draft).await?;
        Ok(source)
    }

    pub async fn update_source(
        &self,
        ctx: &TenantContext,
        draft_id: DraftId,
        source_id: SourceId,
        patch: SourcePatch,
    ) -> DraftResult<Source> {
        let mut draft = self.load_live(ctx, draft_id).await?;
        let source = draft
            .sources
            .iter_mut()
            .find(|source| source.id == source_id)
            .ok_or_else(|| DraftError::NotFound(source_id.to_string()))?;
        if let Some(reference) = patch.reference {
            source.reference = reference;
        }
        if let Some(config) = patch.config {
            source.config = config;
        }
        if let Some(annotations) = patch.annotations {
            source.annotations = annotations;
        }
        let updated = source.clone();
        draft.preview = None;
        self.repo.put(draft).await?;
        Ok(updated)
    }

    pub async fn remove_source(&self, ctx: &TenantContext, draft_id: DraftId, source_id: SourceId) -> DraftResult<()> {
        let mut draft = self.load_live(ctx, draft_id).await?;
        draft.sources.retain(|source| source.id != source_id);
        draft.chunking_overrides.remove(&source_id);
        draft.preview = None;
        self.repo.put(draft).await
    }

    pub async fn set_chunking_override(
        &self,
        ctx: &TenantContext,
        draft_id: DraftId,
        source_id: SourceId,
        config: kb_ingestion::ChunkingConfig,
    ) -> DraftResult<()> {
        config
            .validate()
            .map_err(|err| DraftError::InvalidArgument(err.to_string()))?;
        let mut draft = self.load_live(ctx, draft_id).await?;
        draft.chunking_overrides.insert(source_id, config);
        draft.preview = None;
        self.repo.put(draft).await
    }

    /// Fetches and ingests each source (or just `source_id` if given), bounded by
    /// `PREVIEW_MAX_PAGES`/`PREVIEW_MAX_CHUNKS`. A single source's failure is recorded
    /// in its own `SourcePreview.error` slot rather than failing the whole call.
    pub async fn preview(
        &self,
        ctx: &TenantContext,
        draft_id: DraftId,
        source_id: Option<SourceId>,
    ) -> DraftResult<PreviewBundle> {
        let mut draft = self.load_live(ctx, draft_id).await?;
        let targets: Vec<Source> = draft
            .sources
            .iter()
            .filter(|source| source_id.map_or(true, |id| id == source.id))
            .cloned()
            .collect();

        let mut bundle = PreviewBundle::default();
        for source in targets {
            let chunking = draft.resolved_chunking(source.id);
            let preview = self.preview_one(&source, chunking).await;
            bundle.per_source.insert(source.id, preview);
        }

        draft.preview = Some(bundle.clone());
        self.repo.put(draft).await?;
        Ok(bundle)
    }

    async fn preview_one(&self, source: &Source, chunking: kb_ingestion::ChunkingConfig) -> SourcePreview {
        let adapter = match self.adapters.get(&source.kind.to_string()) {
            Ok(adapter) => adapter,
            Err(err) => return SourcePreview { error: Some(err.to_string()), ..Default::default() },
        };
        if let Err(err) = adapter.validate(&source.reference, &source.config) {
            return SourcePreview { error: Some(err.to_string()), ..Default::default() };
        }

        let mut sink = VecSink::default();
        if let Err(err) = adapter.fetch(&source.reference, &source.config, &mut sink, None).await {
            return SourcePreview { error: Some(err.to_string()), ..Default::default() };
        }

        let parsers = ParserRegistry::with_defaults();
        let chunker = match TextChunker::new(chunking) {
            Ok(chunker) => chunker,
            Err(err) => return SourcePreview { error: Some(err.to_string()), ..Default::default() },
        };

        let mut preview = SourcePreview::default();
        let mut total_headings = 0;
        let mut total_tables = 0;
        for (raw, _checkpoint) in sink.documents.into_iter().take(PREVIEW_MAX_PAGES) {
            let uri = raw.uri.clone();
            let mut structured = match parsers.parse(&raw).await {
                Ok(structured) => structured,
                Err(err) => {
                    warn!(uri = %uri, error = %err, "preview parsing failed for page");
                    preview.error = Some(err.to_string());
                    continue;
                }
            };
            kb_ingestion::clean_document(&mut structured);
            let (headings, tables) = count_headings_and_tables(&structured.elements);
            total_headings += headings;
            total_tables += tables;

            match chunker.chunk(&raw.checksum, &structured).await {
                Ok(chunks) => {
                    preview.pages.push(Page {
                        uri,
                        title: structured.title.clone(),
                        heading_count: headings,
                        table_count: tables,
                        content: String::from_utf8_lossy(&raw.bytes).into_owned(),
                    });
                    preview.stats.language = structured.language.clone();
                    let remaining = PREVIEW_MAX_CHUNKS.saturating_sub(preview.sample_chunks.len());
                    preview.sample_chunks.extend(chunks.into_iter().take(remaining));
                }
                Err(err) => {
                    warn!(uri = %uri, error = %err, "preview chunking failed for page");
                    preview.error = Some(err.to_string());
                }
            }
            if preview.sample_chunks.len() >= PREVIEW_MAX_CHUNKS {
                break;
            }
        }
        preview.stats.heading_count = total_headings;
        preview.stats.table_count = total_tables;
        preview
    }

    pub async fn list_pages(&self, ctx: &TenantContext, draft_id: DraftId, source_id: Option<SourceId>) -> DraftResult<Vec<Page>> {
        let draft = self.load_live(ctx, draft_id).await?;
        let preview = draft.preview.ok_or_else(|| DraftError::ConflictState("draft has no preview yet".into()))?;
        let pages = match source_id {
            Some(id) => preview.per_source.get(&id).map(|p| p.pages.clone()).unwrap_or_default(),
            None => preview.per_source.values().flat_map(|p| p.pages.clone()).collect(),
        };
        Ok(pages)
    }

    pub async fn get_page(&self, ctx: &TenantContext, draft_id: DraftId, index: usize) -> DraftResult<Page> {
        let pages = self.list_pages(ctx, draft_id, None).await?;
        pages.into_iter().nth(index).ok_or_else(|| DraftError::NotFound(format!("page {index}")))
    }

    /// Creates the KB row, queues a `PipelineRun` over the draft's sources, and deletes
    /// the draft. The KB is visible immediately with `status = processing`.
    ///
    /// The draft is claimed (atomically removed) before anything else is created, so two
    /// concurrent `finalize` calls on the same draft can't both succeed: the loser's
    /// `claim` finds nothing and fails with `ConflictState` before it ever touches the
    /// catalog. If building the KB fails after the claim, the draft is put back so the
    /// caller can retry instead of losing it.
    pub async fn finalize(&self, ctx: &TenantContext, draft_id: DraftId) -> DraftResult<(kb_core::types::KbId, String)> {
        let draft = self.load_live(ctx, draft_id).await?;
        if draft.sources.is_empty() {
            return Err(DraftError::InvalidArgument("draft has no sources".into()));
        }

        let key = DraftKey::new(ctx.workspace_id, draft_id);
        let claimed = self
            .repo
            .claim(key)
            .await
            .map_err(|_| DraftError::ConflictState(format!("draft {draft_id} is already being finalized")))?;
        let restore = claimed.clone();

        match self.finalize_claimed(ctx, claimed).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if let Err(restore_err) = self.repo.put(restore).await {
                    warn!(draft_id = %draft_id, error = %restore_err, "failed to restore draft after finalize error");
                }
                Err(err)
            }
        }
    }

    async fn finalize_claimed(&self, ctx: &TenantContext, draft: Draft) -> DraftResult<(kb_core::types::KbId, String)> {
        let kb = crate::model::KnowledgeBase::new(ctx.workspace_id, ctx.user_id, &draft.kb_spec);
        let kb_id = kb.id;
        self.catalog.put_kb(kb).await?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut plan = PipelineRunPlan::new(run_id.clone(), kb_id.to_string()).with_workspace(ctx.workspace_id.to_string());

        for source in &draft.sources {
            let document_id = kb_core::types::DocumentId::new();
            self.catalog
                .put_document(ctx.workspace_id, crate::model::Document {
                    id: document_id,
                    kb_id,
                    source_id: source.id,
                    title: None,
                    uri: source.reference.get("uri").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    checksum: String::new(),
                    status: crate::model::DocumentStatus::Pending,
                    word_count: 0,
                    char_count: 0,
                    chunk_count: 0,
                    parse_metadata: Default::default(),
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
                .await?;

            let chunking = serde_json::to_value(draft.resolved_chunking(source.id)).unwrap_or(serde_json::Value::Null);
            plan = plan.with_source_plan(SourcePlan {
                source_id: source.id.to_string(),
                kind: source.kind,
                reference: source.reference.clone(),
                config: source.config.clone(),
                document_id: document_id.to_string(),
                chunking,
            });
        }

        self.engine
            .start_run(plan)
            .await
            .map_err(|err| DraftError::ConflictState(err.to_string()))?;

        self.release_draft_quota(ctx.workspace_id);
        info!(draft_id = %draft.draft_id, kb_id = %kb_id, run_id = %run_id, "draft finalized");
        Ok((kb_id, run_id))
    }

    pub async fn delete_draft(&self, ctx: &TenantContext, draft_id: DraftId) -> DraftResult<()> {
        let key = DraftKey::new(ctx.workspace_id, draft_id);
        match self.repo.get(key).await {
            Ok(draft) => {
                Self::check_access(ctx, &draft)?;
                self.repo.delete(key).await?;
                self.release_draft_quota(ctx.workspace_id);
                Ok(())
            }
            Err(DraftError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Background TTL sweep, same `tokio::spawn` + interval-sleep idiom
/// `kb_infra::cache::memory::MemoryCache` uses for its own expiry cleanup loop.
/// `quotas`, when set, releases the swept draft's `DraftsPerWorkspace` unit -- an expired
/// draft frees the same quota unit an explicit `delete_draft` would.
pub fn spawn_ttl_sweeper<R: DraftRepository + 'static>(
    repo: Arc<R>,
    interval: Duration,
    quotas: Option<Arc<kb_tenant::quota::QuotaManager>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let expired = repo.list_expired(chrono::Utc::now()).await;
            for key in expired {
                if let Err(err) = repo.delete(key).await {
                    warn!(draft = %key, error = %err, "failed to sweep expired draft");
                } else {
                    if let Some(quotas) = &quotas {
                        quotas.decrement(
                            &key.workspace_id.to_string(),
                            kb_tenant::quota::QuotaType::DraftsPerWorkspace,
                            1,
                        );
                    }
                    info!(draft = %key, "swept expired draft");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogRepository;
    use kb_core::types::{Role, UserId};

    fn ctx(workspace_id: WorkspaceId, user_id: UserId) -> TenantContext {
        TenantContext { org_id: Default::default(), workspace_id, user_id, role: Role::Editor }
    }

    #[tokio::test]
    async fn test_create_and_add_source() {
        let repo = Arc::new(InMemoryDraftRepository::new());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let engine = Arc::new(WorkflowEngine::new());
        let service = DraftService::new(repo, catalog, adapters, engine);

        let workspace_id = WorkspaceId::new();
        let user_id = UserId::new();
        let ctx = ctx(workspace_id, user_id);

        let draft = service.create_draft(&ctx, KbSpec { name: "kb".into(), ..Default::default() }).await.unwrap();
        let spec = SourceSpec {
            kind: kb_core::model::SourceKind::Text,
            reference: serde_json::json!({ "text": "hello world" }),
            config: serde_json::Value::Null,
            annotations: vec![],
        };
        let source = service.add_source(&ctx, draft.draft_id, spec).await.unwrap();
        assert_eq!(source.kind, kb_core::model::SourceKind::Text);
    }

    #[tokio::test]
    async fn test_cross_workspace_access_is_not_found() {
        let repo = Arc::new(InMemoryDraftRepository::new());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let engine = Arc::new(WorkflowEngine::new());
        let service = DraftService::new(repo, catalog, adapters, engine);

        let owner_ctx = ctx(WorkspaceId::new(), UserId::new());
        let draft = service.create_draft(&owner_ctx, KbSpec::default()).await.unwrap();

        let other_ctx = ctx(WorkspaceId::new(), UserId::new());
        let err = service.load_live(&other_ctx, draft.draft_id).await.unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_finalize_creates_kb_and_deletes_draft() {
        let repo = Arc::new(InMemoryDraftRepository::new());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let engine = Arc::new(WorkflowEngine::new());
        let service = DraftService::new(repo.clone(), catalog.clone(), adapters, engine);

        let workspace_id = WorkspaceId::new();
        let user_id = UserId::new();
        let ctx = ctx(workspace_id, user_id);
        let draft = service.create_draft(&ctx, KbSpec { name: "kb".into(), ..Default::default() }).await.unwrap();
        service
            .add_source(&ctx, draft.draft_id, SourceSpec {
                kind: kb_core::model::SourceKind::Text,
                reference: serde_json::json!({ "text": "hello" }),
                config: serde_json::Value::Null,
                annotations: vec![],
            })
            .await
            .unwrap();

        let (kb_id, _run_id) = service.finalize(&ctx, draft.draft_id).await.unwrap();
        assert!(catalog.get_kb(workspace_id, kb_id).await.is_ok());
        let key = DraftKey::new(workspace_id, draft.draft_id);
        assert!(repo.get(key).await.is_err());
    }

    #[tokio::test]
    async fn test_drafts_per_workspace_quota_enforced() {
        let repo = Arc::new(InMemoryDraftRepository::new());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(InMemoryCatalogRepository::new());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let engine = Arc::new(WorkflowEngine::new());
        let quotas = Arc::new(kb_tenant::quota::QuotaManager::new());
        let service = DraftService::new(repo, catalog, adapters, engine).with_quotas(quotas.clone());

        let workspace_id = WorkspaceId::new();
        let user_id = UserId::new();
        let ctx = ctx(workspace_id, user_id);
        quotas.register_tenant(&kb_tenant::Tenant {
            id: workspace_id.to_string(),
            ..kb_tenant::Tenant::new(&workspace_id.to_string(), &workspace_id.to_string(), "owner", kb_tenant::TenantTier::Free)
        });
        quotas.set_custom_limit(&workspace_id.to_string(), kb_tenant::quota::QuotaType::DraftsPerWorkspace, 1);

        service.create_draft(&ctx, KbSpec::default()).await.unwrap();
        let err = service.create_draft(&ctx, KbSpec::default()).await.unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::ResourceExhausted);
    }
}
