// src/server/handlers/mod.rs
//! HTTP request handlers for the arcade server

pub mod admin;
pub mod games;
pub mod misc;

use crate::error::Error;
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fs::File;
use std::io::Seek;
use tokio::io::AsyncWriteExt;

/// Name of the multipart field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

impl Error {
    /// HTTP status for a request that failed with this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArchive(_)
            | Error::PathTraversal(_)
            | Error::InvalidPath(_)
            | Error::InvalidBundleId(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::AlreadyExists(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Uploaded file read fully into memory
pub(crate) struct UploadedBytes {
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// Read the `file` field into memory, skipping any other form fields
pub(crate) async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedBytes, Response> {
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(form_error)?;
        return Ok(UploadedBytes { file_name, data });
    }
    Err(missing_file_field())
}

/// Stream the `file` field into an anonymous temp file
///
/// Returns the file rewound to its start, and its length.
pub(crate) async fn spool_file_field(multipart: &mut Multipart) -> Result<(File, u64), Response> {
    while let Some(mut field) = multipart.next_field().await.map_err(form_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let spool = tempfile::tempfile().map_err(spool_error)?;
        let mut spool = tokio::fs::File::from_std(spool);
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(form_error)? {
            spool.write_all(&chunk).await.map_err(spool_error)?;
            size += chunk.len() as u64;
        }
        spool.flush().await.map_err(spool_error)?;

        let mut spool = spool.into_std().await;
        spool.rewind().map_err(spool_error)?;
        return Ok((spool, size));
    }
    Err(missing_file_field())
}

fn missing_file_field() -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("Missing file field '{FILE_FIELD}'"),
    )
        .into_response()
}

fn spool_error(err: std::io::Error) -> Response {
    tracing::error!("Failed to spool upload: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to write uploaded file").into_response()
}

/// Response for a multipart body that could not be read
///
/// Oversized bodies keep their 413 status.
pub(crate) fn form_error(err: MultipartError) -> Response {
    (
        err.status(),
        format!("Failed to parse form: {}", err.body_text()),
    )
        .into_response()
}
