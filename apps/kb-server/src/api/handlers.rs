//! Handlers for the representative HTTP surface in SPEC_FULL.md SS6.
//!
//! Every handler takes `State<AppState>` plus a `Tenant` extractor and returns
//! `ApiResult<Json<_>>`; the handler itself never constructs a repository or adapter --
//! it only calls through `AppState`'s already-wired services.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use kb_catalog::model::{KbSpec, SourcePatch, SourceSpec};
use kb_catalog::CatalogRepository;
use kb_core::model::SourceKind;
use kb_index::VectorIndex;
use kb_core::types::{ChunkId, DocumentId, DraftId, KbId, SourceId};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::Tenant;
use crate::api::pagination::{paginate, PageQuery, Paginated};
use crate::app::AppState;

fn parse_source_kind(raw: &str) -> ApiResult<SourceKind> {
    match raw {
        "web" => Ok(SourceKind::Web),
        "file" => Ok(SourceKind::File),
        "cloud" => Ok(SourceKind::Cloud),
        "text" => Ok(SourceKind::Text),
        "composite" => Ok(SourceKind::Composite),
        other => Err(ApiError::bad_request(format!("unknown source kind {other}"))),
    }
}

// ---- Drafts (C6) ----------------------------------------------------------

pub async fn create_draft(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Json(spec): Json<KbSpec>,
) -> ApiResult<Json<kb_catalog::model::Draft>> {
    let draft = state.drafts.create_draft(&ctx, spec).await?;
    Ok(Json(draft))
}

#[derive(Debug, Deserialize)]
pub struct AddSourceBody {
    pub reference: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub annotations: Vec<String>,
}

pub async fn add_source(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((draft_id, kind)): Path<(DraftId, String)>,
    Json(body): Json<AddSourceBody>,
) -> ApiResult<Json<kb_catalog::model::Source>> {
    let kind = parse_source_kind(&kind)?;
    let spec = SourceSpec { kind, reference: body.reference, config: body.config, annotations: body.annotations };
    let source = state.drafts.add_source(&ctx, draft_id, spec).await?;
    Ok(Json(source))
}

pub async fn update_source(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((draft_id, source_id)): Path<(DraftId, SourceId)>,
    Json(patch): Json<SourcePatch>,
) -> ApiResult<Json<kb_catalog::model::Source>> {
    let source = state.drafts.update_source(&ctx, draft_id, source_id, patch).await?;
    Ok(Json(source))
}

pub async fn remove_source(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((draft_id, source_id)): Path<(DraftId, SourceId)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.drafts.remove_source(&ctx, draft_id, source_id).await?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn set_chunking_override(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((draft_id, source_id)): Path<(DraftId, SourceId)>,
    Json(config): Json<kb_ingestion::ChunkingConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    state.drafts.set_chunking_override(&ctx, draft_id, source_id, config).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    pub source_id: Option<SourceId>,
}

pub async fn preview(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(draft_id): Path<DraftId>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Json<kb_catalog::model::PreviewBundle>> {
    let bundle = state.drafts.preview(&ctx, draft_id, query.source_id).await?;
    Ok(Json(bundle))
}

#[derive(Debug, Default, Deserialize)]
pub struct PagesQuery {
    pub source_id: Option<SourceId>,
}

pub async fn list_pages(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(draft_id): Path<DraftId>,
    Query(query): Query<PagesQuery>,
) -> ApiResult<Json<Vec<kb_catalog::model::Page>>> {
    let pages = state.drafts.list_pages(&ctx, draft_id, query.source_id).await?;
    Ok(Json(pages))
}

pub async fn get_page(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((draft_id, index)): Path<(DraftId, usize)>,
) -> ApiResult<Json<kb_catalog::model::Page>> {
    let page = state.drafts.get_page(&ctx, draft_id, index).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SampleChunksQuery {
    pub source_id: SourceId,
    pub strategy: Option<kb_ingestion::ChunkingStrategy>,
    pub target_size: Option<usize>,
    pub overlap: Option<usize>,
}

/// `GET /kb-drafts/{id}/chunks?strategy=...`: samples chunks under a candidate config
/// without waiting for `finalize`. Setting the override is how the draft remembers
/// "the last config the caller tried" for the next `preview`/`finalize` (SS4.1).
pub async fn sample_chunks(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(draft_id): Path<DraftId>,
    Query(query): Query<SampleChunksQuery>,
) -> ApiResult<Json<Vec<kb_ingestion::Chunk>>> {
    let mut config = kb_ingestion::ChunkingConfig::default();
    if let Some(strategy) = query.strategy {
        config.strategy = strategy;
    }
    if let Some(target_size) = query.target_size {
        config.target_size = target_size;
    }
    if let Some(overlap) = query.overlap {
        config.overlap = overlap;
    }
    config.validate().map_err(|err| ApiError::bad_request(err.to_string()))?;

    state.drafts.set_chunking_override(&ctx, draft_id, query.source_id, config).await?;
    let bundle = state.drafts.preview(&ctx, draft_id, Some(query.source_id)).await?;
    let chunks = bundle
        .per_source
        .get(&query.source_id)
        .map(|preview| preview.sample_chunks.clone())
        .unwrap_or_default();
    Ok(Json(chunks))
}

#[derive(Debug, serde::Serialize)]
pub struct FinalizeResponse {
    pub kb_id: KbId,
    pub run_id: String,
}

pub async fn finalize(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(draft_id): Path<DraftId>,
) -> ApiResult<Json<FinalizeResponse>> {
    let (kb_id, run_id) = state.drafts.finalize(&ctx, draft_id).await?;
    Ok(Json(FinalizeResponse { kb_id, run_id }))
}

pub async fn delete_draft(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(draft_id): Path<DraftId>,
) -> ApiResult<Json<serde_json::Value>> {
    state.drafts.delete_draft(&ctx, draft_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---- Pipeline runs (C7) ---------------------------------------------------

pub async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<kb_workflow::PipelineRun>> {
    let run = state.engine.get_run(&run_id).await?;
    Ok(Json(run))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn run_logs(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<kb_workflow::StageEvent>>> {
    let run = state.engine.get_run(&run_id).await?;
    let events = match query.since {
        Some(since) => run.stage_log.into_iter().filter(|event| event.ts > since).collect(),
        None => run.stage_log,
    };
    Ok(Json(events))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.cancel_run(&run_id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

pub async fn pause_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.pause_run(&run_id).await?;
    Ok(Json(serde_json::json!({ "paused": true })))
}

pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.resume_run(&run_id).await?;
    Ok(Json(serde_json::json!({ "resumed": true })))
}

// ---- Knowledge bases & documents (C8) -------------------------------------

pub async fn kb_stats(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(kb_id): Path<KbId>,
) -> ApiResult<Json<kb_catalog::model::Stats>> {
    let stats = state.catalog.stats(ctx.workspace_id, kb_id).await?;
    Ok(Json(stats))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(kb_id): Path<KbId>,
    Query(page_query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<kb_catalog::model::Document>>> {
    let documents = state.catalog.list_documents(ctx.workspace_id, kb_id).await?;
    Ok(Json(paginate(documents, page_query)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((_kb_id, document_id)): Path<(KbId, DocumentId)>,
) -> ApiResult<Json<kb_catalog::model::Document>> {
    let document = state.catalog.get_document(ctx.workspace_id, document_id).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentBody {
    pub source_id: SourceId,
    pub uri: String,
}

/// Directly registers a document against an already-finalized KB, outside the draft
/// flow. Scoped reprocessing is triggered by the reconciler picking up the `Pending`
/// status on its next sweep, the same path SS4.7's "updating a document's source config"
/// reprocess takes.
pub async fn create_document(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(kb_id): Path<KbId>,
    Json(body): Json<CreateDocumentBody>,
) -> ApiResult<Json<kb_catalog::model::Document>> {
    let now = chrono::Utc::now();
    let document = kb_catalog::model::Document {
        id: DocumentId::new(),
        kb_id,
        source_id: body.source_id,
        title: None,
        uri: body.uri,
        checksum: String::new(),
        status: kb_catalog::model::DocumentStatus::Pending,
        word_count: 0,
        char_count: 0,
        chunk_count: 0,
        parse_metadata: Default::default(),
        created_at: now,
        updated_at: now,
    };
    state.catalog.put_document(ctx.workspace_id, document.clone()).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentBody {
    pub uri: Option<String>,
}

pub async fn update_document(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((kb_id, document_id)): Path<(KbId, DocumentId)>,
    Json(body): Json<UpdateDocumentBody>,
) -> ApiResult<Json<kb_catalog::model::Document>> {
    let mut document = state.catalog.get_document(ctx.workspace_id, document_id).await?;
    if document.kb_id != kb_id {
        return Err(ApiError::not_found(format!("document {document_id} not in kb {kb_id}")));
    }
    if let Some(uri) = body.uri {
        document.uri = uri;
    }
    document.status = kb_catalog::model::DocumentStatus::Pending;
    document.updated_at = chrono::Utc::now();
    state.catalog.put_document(ctx.workspace_id, document.clone()).await?;
    Ok(Json(document))
}

/// Deletes chunks from the vector index first, then the catalog's chunk rows, then the
/// document row last -- the ordering SS4.5 requires so a crash mid-delete only leaves
/// orphaned vectors (which the reconciler detects), never catalog rows pointing at
/// vectors that no longer exist.
pub async fn delete_document(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((_kb_id, document_id)): Path<(KbId, DocumentId)>,
) -> ApiResult<Json<serde_json::Value>> {
    let document = state.catalog.get_document(ctx.workspace_id, document_id).await?;
    let filter = kb_index::FilteredQuery::new(ctx.workspace_id).document(document_id);
    state.index.delete(document.kb_id, filter).await?;
    state.catalog.delete_chunks_for_document(ctx.workspace_id, document_id).await?;
    state.catalog.delete_document(ctx.workspace_id, document_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunksQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub limit: usize,
    pub document_id: Option<DocumentId>,
}

pub async fn list_chunks(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(kb_id): Path<KbId>,
    Query(query): Query<ChunksQuery>,
) -> ApiResult<Json<Paginated<kb_catalog::model::ChunkRecord>>> {
    let mut chunks = match query.document_id {
        Some(document_id) => state.catalog.list_chunks(ctx.workspace_id, document_id).await?,
        None => state.catalog.list_chunks_for_kb(ctx.workspace_id, kb_id).await?,
    };
    chunks.retain(|chunk| chunk.kb_id == kb_id);
    let page_query = PageQuery {
        page: if query.page == 0 { 1 } else { query.page },
        limit: if query.limit == 0 { 50 } else { query.limit },
    };
    Ok(Json(paginate(chunks, page_query)))
}

#[derive(Debug, Deserialize)]
pub struct SetChunkEnabledBody {
    pub enabled: bool,
}

/// Disables/enables a single chunk without reprocessing: filtered out at catalog query
/// time *and* `payload.enabled=false` upserted in the vector index, per SS4.7.
pub async fn set_chunk_enabled(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path((kb_id, chunk_id)): Path<(KbId, ChunkId)>,
    Json(body): Json<SetChunkEnabledBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.catalog.set_chunk_enabled(ctx.workspace_id, chunk_id, body.enabled).await?;
    state.index.set_enabled(kb_id, chunk_id, body.enabled).await?;
    Ok(Json(serde_json::json!({ "enabled": body.enabled })))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "knowledge-base-etl-pipeline",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
