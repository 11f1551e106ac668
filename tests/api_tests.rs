//! API integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use calc_model::api::{build_router, ApiConfig, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ═══════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════

fn write_export(dir: &Path) {
    fs::write(
        dir.join("_workbook.json"),
        json!({
            "sheets": [
                { "name": "Sheet1", "file": "Sheet1.json", "visibility": "visible" },
                { "name": "Sheet2", "file": "Sheet2.json", "visibility": "visible" }
            ],
            "active_sheet": "Sheet1"
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("Sheet1.json"),
        json!({
            "name": "Sheet1",
            "cells": {
                "A1": { "value": 10, "formula": null, "data_type": "n" },
                "A2": { "value": "=A1*2", "formula": "=A1*2", "data_type": "f" }
            }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("Sheet2.json"),
        json!({
            "name": "Sheet2",
            "cells": {
                "B1": { "value": "=AVERAGE(Sheet1!A1:A2)+A5", "formula": "=AVERAGE(Sheet1!A1:A2)+A5", "data_type": "f" },
                "A5": { "value": 1, "formula": null, "data_type": "n" }
            }
        })
        .to_string(),
    )
    .unwrap();
}

fn app(export_dir: &Path) -> Router {
    build_router(Arc::new(AppState::new(export_dir.to_path_buf())))
}

fn fixture() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    write_export(dir.path());
    let router = app(dir.path());
    (dir, router)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_default() {
    let config = ApiConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8080);
    assert_eq!(config.export_dir, Path::new("exported"));
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("healthy"));
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_version() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["version"], json!(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (_dir, app) = fixture();
    let (_, body) = send(app, get("/")).await;
    let paths: Vec<&str> = body["data"]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/api/v1/run"));
    assert!(paths.contains(&"/api/v1/model"));
}

// ═══════════════════════════════════════════════════════════════════════════
// MODEL
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_model_metadata() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, get("/api/v1/model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "sheets": [
                { "name": "Sheet1", "file": "Sheet1.json", "visibility": "visible" },
                { "name": "Sheet2", "file": "Sheet2.json", "visibility": "visible" }
            ],
            "active_sheet": "Sheet1",
            "has_model": true
        })
    );
}

#[tokio::test]
async fn test_model_without_export() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(app(&dir.path().join("missing")), get("/api/v1/model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["has_model"], json!(false));
    assert_eq!(body["data"]["sheets"], json!([]));
}

// ═══════════════════════════════════════════════════════════════════════════
// RUN
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_run_without_inputs() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, post_json("/api/v1/run", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let cells = &body["data"]["cells"];
    assert_eq!(cells["A1"], json!(10.0));
    assert_eq!(cells["A2"], json!(20.0));
    assert_eq!(cells["Sheet2!B1"], json!(16.0));
    assert_eq!(body["data"]["metadata"]["has_model"], json!(true));
}

#[tokio::test]
async fn test_run_with_inputs() {
    let (_dir, app) = fixture();
    let request = post_json(
        "/api/v1/run",
        json!({ "inputs": { "A1": 5, "Sheet2!A5": 0.5, "Nowhere!A1": 1 } }),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);

    let cells = &body["data"]["cells"];
    assert_eq!(cells["A1"], json!(5.0));
    assert_eq!(cells["Sheet1!A2"], json!(10.0));
    assert_eq!(cells["Sheet2!B1"], json!(8.0));
}

#[tokio::test]
async fn test_run_rejects_non_numeric_inputs() {
    let (_dir, app) = fixture();
    let request = post_json("/api/v1/run", json!({ "inputs": { "A1": "five" } }));
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_run_without_export_is_empty() {
    let dir = TempDir::new().unwrap();
    let router = app(&dir.path().join("missing"));
    let (status, body) = send(router, post_json("/api/v1/run", json!({ "inputs": {} }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cells"], json!({}));
    assert_eq!(body["data"]["metadata"]["has_model"], json!(false));
}

// ═══════════════════════════════════════════════════════════════════════════
// DEPS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_deps_for_formula() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, post_json("/api/v1/deps", json!({ "cell": "Sheet2!B1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "cell": "Sheet2!B1",
            "formula": "=AVERAGE(Sheet1!A1:A2)+A5",
            "dependencies": ["Sheet1!A1", "Sheet1!A2", "Sheet2!A5"],
            "value": 16.0
        })
    );
}

#[tokio::test]
async fn test_deps_for_constant() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, post_json("/api/v1/deps", json!({ "cell": "A1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cell"], json!("Sheet1!A1"));
    assert_eq!(body["data"]["formula"], Value::Null);
    assert_eq!(body["data"]["dependencies"], json!([]));
}

#[tokio::test]
async fn test_deps_unknown_cell() {
    let (_dir, app) = fixture();
    let (status, body) = send(app, post_json("/api/v1/deps", json!({ "cell": "Z99" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
    assert!(body.get("data").is_none());
}
