//! HTTP API tests driven through the router with `oneshot`

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bookpair_import::config::ImportConfig;
use bookpair_import::{build_router, AppState};
use helpers::{create_test_db, fake_orchestrator, EpubFixture};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

/// Test helper: router over a temp database and fake oracles
async fn create_test_app() -> (axum::Router, TempDir) {
    let (dir, pool) = create_test_db().await;
    let config = ImportConfig::default();
    let orchestrator = fake_orchestrator(pool.clone(), config.clone(), 0.9);
    let state = AppState::new(pool, Arc::new(config), Arc::new(orchestrator));
    (build_router(state), dir)
}

fn write_books(dir: &TempDir) -> (String, String) {
    let src = EpubFixture::new()
        .chapter(
            "One",
            &[
                "Greta planted the apple trees along the northern fence.",
                "Hugo repaired the old clock that hung in the kitchen.",
            ],
        )
        .write_to(dir.path(), "en.epub");
    let tgt = EpubFixture::new()
        .chapter(
            "Um",
            &[
                "Greta plantou as macieiras ao longo da cerca do norte.",
                "Hugo consertou o velho relógio pendurado na cozinha.",
            ],
        )
        .write_to(dir.path(), "pt.epub");
    (src.display().to_string(), tgt.display().to_string())
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn post_import(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/import/book-pair")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = create_test_app().await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "bookpair-import");
    assert_eq!(body["database"], true);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_import_endpoint_returns_summary() {
    let (app, dir) = create_test_app().await;
    let (src, tgt) = write_books(&dir);

    let (status, body) = send(&app, post_import(json!({ "src_path": src, "tgt_path": tgt }))).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["inserted"], 2);
    assert_eq!(body["skipped"], 0);
    assert_eq!(body["chapter_count"], 1);
    assert_eq!(body["examples"].as_array().unwrap().len(), 2);

    let (status, stats) = send(&app, get("/inbox/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);
}

#[tokio::test]
async fn test_import_rejects_invalid_min_quality() {
    let (app, dir) = create_test_app().await;
    let (src, tgt) = write_books(&dir);

    let (status, body) = send(
        &app,
        post_import(json!({ "src_path": src, "tgt_path": tgt, "min_quality": 2.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unreadable_book_is_unprocessable_and_reported_by_health() {
    let (app, dir) = create_test_app().await;
    let (src, _) = write_books(&dir);
    let missing = dir.path().join("nope.epub").display().to_string();

    let (status, body) = send(&app, post_import(json!({ "src_path": src, "tgt_path": missing }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNPROCESSABLE_INPUT");

    let (_, health) = send(&app, get("/health")).await;
    let last_error = health["last_error"].as_str().unwrap();
    assert!(last_error.contains("target"), "last_error: {}", last_error);
}

#[tokio::test]
async fn test_unknown_mode_is_rejected_before_import() {
    let (app, dir) = create_test_app().await;
    let (src, tgt) = write_books(&dir);

    let (status, _) = send(
        &app,
        post_import(json!({ "src_path": src, "tgt_path": tgt, "mode": "fuzzy" })),
    )
    .await;
    assert!(status.is_client_error());

    let (_, stats) = send(&app, get("/inbox/stats")).await;
    assert_eq!(stats["total"], 0);
}
