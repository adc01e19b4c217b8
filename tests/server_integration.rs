// tests/server_integration.rs

//! End-to-end tests for the HTTP surface
//!
//! Each test drives the axum router directly with `oneshot`, backed by a
//! scratch bundle store and an in-memory remote.

mod common;

use arcade::BundleId;
use axum::http::{StatusCode, header};
use common::{TestServer, body_bytes, body_json, get, multipart_request, zip_bytes};
use std::time::Duration;
use tower::ServiceExt;

/// Poll `uri` until it stops answering 404, or give up after ~2s.
async fn wait_for_ok(server: &TestServer, uri: &str) -> axum::http::Response<axum::body::Body> {
    for _ in 0..100 {
        let response = server.router().oneshot(get(uri)).await.unwrap();
        if response.status() != StatusCode::NOT_FOUND {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{uri} never became available");
}

#[tokio::test]
async fn test_upload_then_play() {
    let server = TestServer::new();
    let archive = zip_bytes(&[
        ("game/", b""),
        ("game/index.html", b"<html>hello</html>"),
        ("game/assets/a.png", b"\x89PNG-data"),
        ("__MACOSX/game/._index.html", b"junk"),
    ]);

    let response = server
        .router()
        .oneshot(multipart_request("/uploadGame", "file", "game.zip", &archive))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    let id = json["bundleId"].as_str().unwrap().to_string();
    assert_eq!(json["gameId"], id.as_str());
    assert_eq!(json["playUrl"], format!("/play/{id}/"));
    BundleId::parse(&id).unwrap();

    let response = server.router().oneshot(get(&format!("/play/{id}/"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert_eq!(body_bytes(response).await, b"<html>hello</html>");

    let response = server
        .router()
        .oneshot(get(&format!("/play/{id}/assets/a.png")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(response).await, b"\x89PNG-data");

    // Junk never lands in the bundle
    let dir = server.state.store.bundle_dir(&BundleId::parse(&id).unwrap());
    assert!(dir.join("index.html").is_file());
    assert!(!dir.join("__MACOSX").exists());
    assert!(!dir.join("game").exists());
}

#[tokio::test]
async fn test_upload_is_mirrored_with_marker() {
    let server = TestServer::new();
    let archive = zip_bytes(&[("index.html", b"<html/>"), ("main.js", b"run()")]);

    let response = server
        .router()
        .oneshot(multipart_request("/api/uploadGame", "file", "game.zip", &archive))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let id = BundleId::parse(body_json(response).await["bundleId"].as_str().unwrap()).unwrap();

    for _ in 0..100 {
        if server.remote.object(&id.marker_key()).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(server.remote.object(&id.marker_key()).unwrap(), b"<html/>");
    assert_eq!(server.remote.object(&id.remote_key("main.js")).unwrap(), b"run()");
    assert_eq!(server.remote.content_type(&id.marker_key()).unwrap(), "text/html");
}

#[tokio::test]
async fn test_traversal_archive_rejected() {
    let server = TestServer::new();
    let archive = zip_bytes(&[("index.html", b"ok"), ("../../etc/evil", b"pwned")]);

    let response = server
        .router()
        .oneshot(multipart_request("/uploadGame", "file", "evil.zip", &archive))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(server.state.store.list().unwrap().is_empty());
    assert!(!server.temp.path().join("etc").exists());
    assert_eq!(server.state.metrics.snapshot().uploads_rejected, 1);
}

#[tokio::test]
async fn test_non_zip_rejected() {
    let server = TestServer::new();

    let response = server
        .router()
        .oneshot(multipart_request("/uploadGame", "file", "game.zip", b"definitely not a zip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.state.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_file_field_rejected() {
    let server = TestServer::new();
    let archive = zip_bytes(&[("index.html", b"ok")]);

    let response = server
        .router()
        .oneshot(multipart_request("/uploadGame", "upload", "game.zip", &archive))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_miss_hydrates_then_serves() {
    let server = TestServer::new();
    let id = BundleId::new();
    server.remote.insert(&id.marker_key(), "<html>remote</html>");
    server.remote.insert(&id.remote_key("js/app.js"), "boot()");

    let response = server.router().oneshot(get(&format!("/play/{id}/"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_bytes(response).await,
        arcade::server::NOT_YET_AVAILABLE.as_bytes()
    );

    let response = wait_for_ok(&server, &format!("/play/{id}/js/app.js")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"boot()");

    let response = server.router().oneshot(get(&format!("/play/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"<html>remote</html>");

    let snapshot = server.state.metrics.snapshot();
    assert!(snapshot.misses >= 1);
    assert!(snapshot.hits >= 2);
}

#[tokio::test]
async fn test_incomplete_remote_bundle_never_served() {
    let server = TestServer::new();
    let id = BundleId::new();
    server.remote.insert(&id.remote_key("assets/a.png"), "png");

    for _ in 0..3 {
        let response = server.router().oneshot(get(&format!("/play/{id}/"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!server.state.store.exists(&id));
}

#[tokio::test]
async fn test_failed_hydration_retried_on_next_request() {
    let server = TestServer::new();
    let id = BundleId::new();
    server.remote.insert(&id.remote_key("js/app.js"), "boot()");

    let response = server.router().oneshot(get(&format!("/play/{id}/"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    for _ in 0..100 {
        if server.state.metrics.snapshot().hydrations_failed >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.state.metrics.snapshot().hydrations_failed >= 1);

    // The upload finishes remotely; the miss is not remembered
    server.remote.insert(&id.marker_key(), "<html>late</html>");
    let response = wait_for_ok(&server, &format!("/play/{id}/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"<html>late</html>");
    assert!(server.state.metrics.snapshot().hydrations_completed >= 1);
}

#[tokio::test]
async fn test_hydrates_bundle_with_folder_markers() {
    let server = TestServer::new();
    let id = BundleId::new();
    server.remote.insert(&id.marker_key(), "<html>ok</html>");
    server.remote.insert(&id.remote_key("assets/"), "");
    server.remote.insert(&id.remote_key("assets/a.png"), "png");

    let response = wait_for_ok(&server, &format!("/play/{id}/assets/a.png")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"png");
}

#[tokio::test]
async fn test_missing_file_in_present_bundle() {
    let server = TestServer::new();
    let archive = zip_bytes(&[("index.html", b"ok")]);
    let response = server
        .router()
        .oneshot(multipart_request("/uploadGame", "file", "game.zip", &archive))
        .await
        .unwrap();
    let id = body_json(response).await["bundleId"].as_str().unwrap().to_string();

    let response = server
        .router()
        .oneshot(get(&format!("/play/{id}/nope.js")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_ne!(
        body_bytes(response).await,
        arcade::server::NOT_YET_AVAILABLE.as_bytes()
    );
}

#[tokio::test]
async fn test_misc_upload_and_serve() {
    let server = TestServer::new();

    let response = server
        .router()
        .oneshot(multipart_request("/uploadMiscFile", "file", "Shot.PNG", b"png-bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["message"], "File uploaded successfully");
    let file_id = json["fileId"].as_str().unwrap().to_string();
    assert_eq!(json["url"], format!("https://arcade.test/misc-file/{file_id}"));

    let key = format!("misc-files/{file_id}.png");
    assert_eq!(server.remote.object(&key).unwrap(), b"png-bytes");
    assert_eq!(server.remote.content_type(&key).unwrap(), "image/png");

    for uri in [
        format!("/misc-file/{file_id}"),
        format!("/api/misc-file/{file_id}.png"),
    ] {
        let response = server.router().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000"
        );
        assert_eq!(body_bytes(response).await, b"png-bytes");
    }
}

#[tokio::test]
async fn test_misc_rejects_disallowed_type() {
    let server = TestServer::new();

    let response = server
        .router()
        .oneshot(multipart_request("/api/uploadMiscFile", "file", "notes.txt", b"hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.remote.keys().is_empty());
}

#[tokio::test]
async fn test_misc_unknown_file() {
    let server = TestServer::new();
    let missing = uuid::Uuid::now_v7();

    let response = server
        .router()
        .oneshot(get(&format!("/misc-file/{missing}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let server = TestServer::new();
    let archive = zip_bytes(&[("index.html", b"ok")]);
    server
        .router()
        .oneshot(multipart_request("/uploadGame", "file", "game.zip", &archive))
        .await
        .unwrap();

    let response = server.router().oneshot(get("/admin/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["bundles_ingested"], 1);
    assert_eq!(json["local_bundles"], 1);
    assert_eq!(json["remote"], "memory");
}
