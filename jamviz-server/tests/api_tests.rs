//! Integration tests for the jamviz-server HTTP surface
//!
//! Covers:
//! - Health check
//! - Frame stream upgrade routes (/ and /ws)
//! - Extension ingestion (POST /track)
//! - Play history (GET /history)
//! - Media cache files (GET /media/*)

mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use jamviz_common::models::HistoryEntry;
use jamviz_common::SourceKind;
use jamviz_server::api::{create_router, AppState};
use jamviz_server::broadcast::spawn_hub;
use jamviz_server::db::{HistorySink, HistoryStore};
use jamviz_server::sources::ExtensionInbox;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    app: Router,
    inbox: Arc<ExtensionInbox>,
    history: HistoryStore,
    media_dir: TempDir,
}

async fn setup_test_server() -> TestServer {
    let inbox = Arc::new(ExtensionInbox::new());
    let history = helpers::memory_history(100).await;
    let media_dir = tempfile::tempdir().expect("temp media dir");

    let app = create_router(AppState {
        hub: spawn_hub(30),
        inbox: Arc::clone(&inbox),
        history: history.clone(),
        media_dir: media_dir.path().to_path_buf(),
    });

    TestServer {
        app,
        inbox,
        history,
        media_dir,
    }
}

async fn make_request(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn as_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("JSON body")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = setup_test_server().await;

    let (status, body) = make_request(&server.app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = as_json(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "jamviz-server");
    assert!(body["version"].is_string());
    assert!(body["git_hash"].is_string());
}

/// Upgrade request as a browser sends it
fn upgrade_request(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_frame_stream_on_root_and_ws() {
    let server = setup_test_server().await;

    // oneshot carries no connection to upgrade: a routed upgrade request gets
    // as far as the extractor and answers 426, an unrouted one 404
    for path in ["/", "/ws"] {
        let response = server.app.clone().oneshot(upgrade_request(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED, "path {}", path);
    }

    let response = server.app.clone().oneshot(upgrade_request("/frames")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_push_track_reaches_inbox() {
    let server = setup_test_server().await;

    let (status, body) = make_request(
        &server.app,
        Method::POST,
        "/track",
        Some(json!({"artist": "Khruangbin", "title": "Maria También", "album": "Con Todo El Mundo"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "ok");

    let candidate = server.inbox.take().expect("candidate stored");
    assert_eq!(candidate.source, SourceKind::Extension);
    assert_eq!(candidate.artist, "Khruangbin");
    assert_eq!(candidate.album, "Con Todo El Mundo");
    assert!(server.inbox.take().is_none());
}

#[tokio::test]
async fn test_push_track_ignores_empty() {
    let server = setup_test_server().await;

    let (status, body) = make_request(
        &server.app,
        Method::POST,
        "/track",
        Some(json!({"artist": " ", "title": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "ignored");
    assert!(server.inbox.take().is_none());
}

#[tokio::test]
async fn test_history_newest_first() {
    let server = setup_test_server().await;
    let now = Utc::now();
    for (i, title) in ["First", "Second", "Third"].iter().enumerate() {
        server
            .history
            .record(HistoryEntry {
                artist: "Air".to_string(),
                title: title.to_string(),
                album: String::new(),
                source: SourceKind::WindowTitle,
                timestamp: now + ChronoDuration::seconds(i as i64),
            })
            .await
            .unwrap();
    }

    let (status, body) = make_request(&server.app, Method::GET, "/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = as_json(&body);
    let titles: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);
    assert_eq!(entries[0]["source"], "chrome_tab");
}

#[tokio::test]
async fn test_media_files_served() {
    let server = setup_test_server().await;
    let thumbnails = server.media_dir.path().join("thumbnails");
    std::fs::create_dir_all(&thumbnails).unwrap();
    std::fs::write(thumbnails.join("abc123.jpg"), b"not really a jpeg").unwrap();

    let (status, body) = make_request(&server.app, Method::GET, "/media/thumbnails/abc123.jpg", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"not really a jpeg");

    let (status, _) = make_request(&server.app, Method::GET, "/media/thumbnails/missing.jpg", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = setup_test_server().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/track")
        .header(header::ORIGIN, "https://music.youtube.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
