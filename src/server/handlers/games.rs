// src/server/handlers/games.rs
//! Game bundle endpoints
//!
//! Uploads unpack a zip into a new bundle and answer immediately; mirroring
//! to the remote store happens afterwards. Play requests serve straight from
//! the bundle store. A bundle that is not present locally starts a hydration
//! and gets a 404 asking the player to retry.

use crate::archive;
use crate::bundle::{BundleId, INDEX_FILE};
use crate::error::Error;
use crate::server::handlers::spool_file_field;
use crate::server::{ServerState, spawn_upload, trigger_hydration};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Body of the 404 returned while a missing bundle is being pulled
pub const NOT_YET_AVAILABLE: &str =
    "Game not found. The server will try to download it asap. Please try again later.";

/// Successful upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    pub bundle_id: String,
    /// Same value as `bundle_id`, for clients of the older response shape
    pub game_id: String,
    pub play_url: String,
}

/// POST /uploadGame, /api/uploadGame
///
/// Multipart form with a `file` field holding a zip archive. Returns:
/// - 200 OK with `{ok, bundleId, playUrl}`
/// - 400 Bad Request for a missing field, a non-zip body, or an entry whose
///   path escapes the bundle
/// - 413 Payload Too Large above the configured limit
pub async fn upload_game(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    let (archive_file, size) = match spool_file_field(&mut multipart).await {
        Ok(spooled) => spooled,
        Err(response) => {
            state.metrics.record_upload_rejected();
            return response;
        }
    };

    let store = state.store.clone();
    let ingested = tokio::task::spawn_blocking(move || archive::ingest(&store, archive_file)).await;

    let id = match ingested {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            tracing::warn!("Rejected game upload: {}", e);
            state.metrics.record_upload_rejected();
            return e.into_response();
        }
        Err(e) => {
            tracing::error!("Ingestion task failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to unpack archive").into_response();
        }
    };

    tracing::info!(bundle_id = %id, bytes = size, "Game uploaded");
    state.metrics.record_ingest(size);
    spawn_upload(&state, id);

    Json(UploadResponse {
        ok: true,
        bundle_id: id.to_string(),
        game_id: id.to_string(),
        play_url: format!("/play/{}/", id),
    })
    .into_response()
}

/// GET /play/:id and /play/:id/
///
/// Serves the bundle's `index.html`.
pub async fn play_index(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Response {
    serve_bundle_file(&state, &id, INDEX_FILE).await
}

/// GET /play/:id/*asset
pub async fn play_asset(
    State(state): State<Arc<ServerState>>,
    Path((id, asset)): Path<(String, String)>,
) -> Response {
    serve_bundle_file(&state, &id, &asset).await
}

async fn serve_bundle_file(state: &Arc<ServerState>, id: &str, relative: &str) -> Response {
    let id = match BundleId::parse(id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    if !state.store.exists(&id) {
        state.metrics.record_miss();
        trigger_hydration(state, id);
        return (StatusCode::NOT_FOUND, NOT_YET_AVAILABLE).into_response();
    }

    let path = match state.store.path(&id, relative) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Error::NotFound(relative.to_string()).into_response(),
    };

    let file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
        }
    };

    state.metrics.record_hit();

    let content_type = content_type_for_asset(relative);
    let body = Body::from_stream(ReaderStream::new(file));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response()
}

/// Content type for a served asset; text types carry a UTF-8 charset
fn content_type_for_asset(relative: &str) -> String {
    let mime = mime_guess::from_path(relative).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT || mime.subtype() == mime_guess::mime::JAVASCRIPT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for_asset() {
        assert_eq!(content_type_for_asset("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for_asset("assets/a.png"), "image/png");
        assert_eq!(content_type_for_asset("game.wasm"), "application/wasm");
        assert_eq!(content_type_for_asset("noext"), "application/octet-stream");
    }

    #[test]
    fn test_upload_response_shape() {
        let response = UploadResponse {
            ok: true,
            bundle_id: "id".to_string(),
            game_id: "id".to_string(),
            play_url: "/play/id/".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["bundleId"], "id");
        assert_eq!(json["playUrl"], "/play/id/");
        assert_eq!(json["ok"], true);
    }
}
