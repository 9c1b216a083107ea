//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Slack on top of the chunk size for multipart framing and form fields.
const BODY_LIMIT_OVERHEAD: usize = 1024 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        // Health check (intentionally unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .route("/api/v1/auth/register", post(handlers::register))
        .route("/api/v1/auth/login", post(handlers::login));

    let protected = Router::new()
        // Upload control plane
        .route("/api/v1/upload/init", post(handlers::init_upload))
        .route("/api/v1/upload/chunk", post(handlers::upload_chunk))
        .route("/api/v1/upload/merge", post(handlers::merge_chunks))
        .route("/api/v1/upload/fast", post(handlers::fast_upload))
        .route("/api/v1/upload/cancel", delete(handlers::cancel_upload))
        // File surface
        .route("/api/v1/files", get(handlers::list_files))
        .route(
            "/api/v1/files/{hash}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/v1/files/{hash}/download", get(handlers::download_file))
        // Content surface
        .route("/api/v1/contents", get(handlers::list_contents))
        .route("/api/v1/contents/{id}", get(handlers::get_content))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let body_limit = state.config.server.max_chunk_size as usize + BODY_LIMIT_OVERHEAD;

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
