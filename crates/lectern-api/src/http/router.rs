//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing, request body limit.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Headroom on top of the largest accepted upload for multipart framing and
/// the accompanying text fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(state.config.files.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let api_routes = Router::new()
        // Sessions
        .route("/sessions", post(handlers::session::create_session))
        .route(
            "/courses/{course_id}/sessions",
            get(handlers::session::list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(handlers::session::get_conversation)
                .patch(handlers::session::rename_session)
                .delete(handlers::session::delete_session),
        )
        // Conversation
        .route(
            "/sessions/{id}/messages",
            post(handlers::session::send_message),
        )
        .route(
            "/sessions/{id}/transcript",
            get(handlers::session::get_transcript),
        )
        // Slides
        .route(
            "/sessions/{id}/next-slide",
            post(handlers::session::next_slide),
        )
        .route("/sessions/{id}/deck", put(handlers::session::replace_deck));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
