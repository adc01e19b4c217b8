// src/server/handlers/misc.rs
//! Standalone media files (screenshots, trailers, audio)
//!
//! Stored only in the remote store under `misc-files/<uuid><ext>`; nothing
//! touches the local bundle store.

use crate::bundle::MISC_PREFIX;
use crate::error::Error;
use crate::remote::list_all;
use crate::server::ServerState;
use crate::server::handlers::read_file_field;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Accepted extensions and the content type each is stored with
const ALLOWED_TYPES: &[(&str, &str)] = &[
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".mp4", "video/mp4"),
    (".gif", "image/gif"),
    (".mov", "video/quicktime"),
    (".mp3", "audio/mpeg"),
];

/// Successful misc upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscUploadResponse {
    pub ok: bool,
    pub url: String,
    pub file_id: String,
    pub message: String,
}

/// Lowercased extension (with dot) and its content type, if allowed
fn allowed_type(file_name: &str) -> Option<(String, &'static str)> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = format!(".{}", ext.to_ascii_lowercase());
    ALLOWED_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == ext)
        .map(|(_, content_type)| (ext, *content_type))
}

/// POST /uploadMiscFile, /api/uploadMiscFile
pub async fn upload_misc(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    let upload = match read_file_field(&mut multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let Some((ext, content_type)) = upload.file_name.as_deref().and_then(allowed_type) else {
        return (
            StatusCode::BAD_REQUEST,
            "File type not allowed. Allowed types: png, jpg, jpeg, mp4, gif, mov, mp3",
        )
            .into_response();
    };

    let file_id = Uuid::now_v7().hyphenated().to_string();
    let key = format!("{MISC_PREFIX}{file_id}{ext}");
    let size = upload.data.len();

    if let Err(e) = state.remote.put(&key, upload.data.to_vec(), content_type).await {
        tracing::error!(%key, "Failed to upload misc file: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file").into_response();
    }

    tracing::info!(%key, bytes = size, "Stored misc file");
    state.metrics.record_misc_upload();

    Json(MiscUploadResponse {
        ok: true,
        url: format!("{}/misc-file/{}", state.config.public_url, file_id),
        file_id,
        message: "File uploaded successfully".to_string(),
    })
    .into_response()
}

/// GET /misc-file/:file_id, /api/misc-file/:file_id
///
/// Any extension on the id is ignored; the stored object decides the
/// content type.
pub async fn serve_misc(State(state): State<Arc<ServerState>>, Path(file): Path<String>) -> Response {
    let file_id = file.split_once('.').map_or(file.as_str(), |(id, _)| id);
    if file_id.len() != 36 || Uuid::parse_str(file_id).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid file id").into_response();
    }

    let prefix = format!("{MISC_PREFIX}{file_id}");
    let key = match list_all(state.remote.as_ref(), &prefix).await {
        Ok(keys) => match keys.into_iter().next() {
            Some(key) => key,
            None => return Error::NotFound(format!("File {file_id}")).into_response(),
        },
        Err(e) => return e.into_response(),
    };

    let data = match state.remote.get(&key).await {
        Ok(data) => data,
        Err(e) => return e.into_response(),
    };

    state.metrics.record_misc_served();

    let content_type = key
        .rsplit_once('.')
        .and_then(|(_, ext)| allowed_type(&format!("x.{ext}")))
        .map_or("application/octet-stream", |(_, content_type)| content_type);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000"),
        ],
        data,
    )
        .into_response()
}
