// src/server/routes.rs
//! Axum router configuration for the arcade server
//!
//! - Upload routes carry their own body limits
//! - Play routes are compressed (HTML and JS compress well)
//! - Misc media is served uncompressed

use crate::server::ServerState;
use crate::server::handlers::{admin, games, misc};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Create the main application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);
    let game_limit = DefaultBodyLimit::max(state.config.max_game_upload);
    let misc_limit = DefaultBodyLimit::max(state.config.max_misc_upload);

    let upload_routes = Router::new()
        .route("/uploadGame", post(games::upload_game).layer(game_limit))
        .route("/api/uploadGame", post(games::upload_game).layer(game_limit))
        .route("/uploadMiscFile", post(misc::upload_misc).layer(misc_limit))
        .route("/api/uploadMiscFile", post(misc::upload_misc).layer(misc_limit))
        .with_state(state.clone());

    // Media is already compressed
    let media_routes = Router::new()
        .route("/misc-file/:file_id", get(misc::serve_misc))
        .route("/api/misc-file/:file_id", get(misc::serve_misc))
        .with_state(state.clone());

    let compressed_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/play/:id", get(games::play_index))
        .route("/play/:id/", get(games::play_index))
        .route("/play/:id/*asset", get(games::play_asset))
        .route("/admin/stats", get(admin::stats))
        .layer(CompressionLayer::new())
        .with_state(state);

    Router::new()
        .merge(upload_routes)
        .merge(media_routes)
        .merge(compressed_routes)
        .layer(cors)
}

/// Any origin when none are configured, otherwise exactly the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

async fn root() -> &'static str {
    "Arcade game server. Upload a zip to /uploadGame, play at /play/<id>/"
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
