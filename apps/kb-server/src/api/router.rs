//! Route table for the representative HTTP surface in SPEC_FULL.md SS6.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::app::AppState;

pub fn build_router(state: AppState) -> Router {
    let draft_routes = Router::new()
        .route("/kb-drafts", post(handlers::create_draft))
        .route("/kb-drafts/:draft_id", delete(handlers::delete_draft))
        .route("/kb-drafts/:draft_id/sources/:kind", post(handlers::add_source))
        .route(
            "/kb-drafts/:draft_id/sources/:source_id",
            put(handlers::update_source).delete(handlers::remove_source),
        )
        .route(
            "/kb-drafts/:draft_id/sources/:source_id/chunking",
            post(handlers::set_chunking_override),
        )
        .route("/kb-drafts/:draft_id/preview", post(handlers::preview))
        .route("/kb-drafts/:draft_id/pages", get(handlers::list_pages))
        .route("/kb-drafts/:draft_id/pages/:index", get(handlers::get_page))
        .route("/kb-drafts/:draft_id/chunks", get(handlers::sample_chunks))
        .route("/kb-drafts/:draft_id/finalize", post(handlers::finalize));

    let pipeline_routes = Router::new()
        .route("/kb-pipeline/:run_id/status", get(handlers::run_status))
        .route("/kb-pipeline/:run_id/logs", get(handlers::run_logs))
        .route("/kb-pipeline/:run_id/cancel", post(handlers::cancel_run))
        .route("/kb-pipeline/:run_id/pause", post(handlers::pause_run))
        .route("/kb-pipeline/:run_id/resume", post(handlers::resume_run));

    let kb_routes = Router::new()
        .route("/kbs/:kb_id/stats", get(handlers::kb_stats))
        .route(
            "/kbs/:kb_id/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route(
            "/kbs/:kb_id/documents/:document_id",
            get(handlers::get_document).put(handlers::update_document).delete(handlers::delete_document),
        )
        .route("/kbs/:kb_id/chunks", get(handlers::list_chunks))
        .route("/kbs/:kb_id/chunks/:chunk_id/enabled", put(handlers::set_chunk_enabled));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(draft_routes)
        .merge(pipeline_routes)
        .merge(kb_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        AppState::new(kb_core::AppConfig::load().expect("defaults should build a config"))
            .await
            .expect("app state should build")
    }

    #[tokio::test]
    async fn test_root_route() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_route() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_draft_requires_tenant_headers() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/kb-drafts")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"docs","description":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
