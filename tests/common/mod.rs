// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use arcade::MemoryStore;
use arcade::server::{ServerConfig, ServerState, create_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const BOUNDARY: &str = "arcade-test-boundary";

/// A router over a scratch bundle store and an in-memory remote.
///
/// Keep the struct alive for the duration of the test; dropping it removes
/// the store.
pub struct TestServer {
    pub temp: TempDir,
    pub remote: Arc<MemoryStore>,
    pub state: Arc<ServerState>,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_remote(MemoryStore::new())
    }

    pub fn with_remote(remote: MemoryStore) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let remote = Arc::new(remote);
        let config = ServerConfig {
            storage_root: temp.path().join("games"),
            public_url: "https://arcade.test".to_string(),
            ..Default::default()
        };
        let state = Arc::new(ServerState::new(config, remote.clone()).unwrap());
        Self { temp, remote, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Build a zip archive in memory. Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// POST a single multipart file field.
pub fn multipart_request(uri: &str, field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
