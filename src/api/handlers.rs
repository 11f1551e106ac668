//! API request handlers
//!
//! Loading and evaluation are synchronous and bounded, so every handler that
//! touches the export runs it on the blocking pool. Each request loads its
//! own copy of the workbook.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::core::reference::dependencies;
use crate::error::CalcResult;
use crate::loader::load_workbook;
use crate::metadata::{get_model_metadata, ModelMetadata};
use crate::runner::{run_calculation, run_workbook, RunOutput};
use crate::types::{qualify, CellValue, Overrides};

use super::server::AppState;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(path: &str, method: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Calc Model API Server".to_string(),
        version: state.version.clone(),
        description: "What-if recalculation of an exported spreadsheet model".to_string(),
        endpoints: vec![
            endpoint("/health", "GET", "Health check endpoint"),
            endpoint("/version", "GET", "Get server version"),
            endpoint("/api/v1/model", "GET", "Sheets in the loaded export"),
            endpoint("/api/v1/run", "POST", "Recalculate with input overrides"),
            endpoint("/api/v1/deps", "POST", "Cells a formula reads"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec!["model".to_string(), "run".to_string(), "deps".to_string()],
    }))
}

/// GET /api/v1/model - Export metadata
pub async fn model(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let export_dir = state.export_dir.clone();
    match tokio::task::spawn_blocking(move || get_model_metadata(&export_dir)).await {
        Ok(metadata) => (StatusCode::OK, Json(ApiResponse::ok(metadata))),
        Err(e) => {
            error!(error = %e, "model task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ModelMetadata>::err(e.to_string())),
            )
        }
    }
}

/// Run request
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub inputs: Overrides,
}

/// POST /api/v1/run - Recalculate with overrides
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> impl IntoResponse {
    let export_dir = state.export_dir.clone();
    let inputs = req.inputs.len();
    let result =
        tokio::task::spawn_blocking(move || run_calculation(&req.inputs, &export_dir)).await;

    match flatten(result) {
        Ok(output) => {
            info!(inputs, cells = output.cells.len(), "run complete");
            (StatusCode::OK, Json(ApiResponse::ok(output)))
        }
        Err(message) => {
            error!(error = %message, "run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<RunOutput>::err(message)),
            )
        }
    }
}

/// Dependencies request
#[derive(Debug, Deserialize)]
pub struct DepsRequest {
    pub cell: String,
}

/// Dependencies response
#[derive(Debug, Default, Serialize)]
pub struct DepsResponse {
    /// Sheet-qualified key of the requested cell
    pub cell: String,
    pub formula: Option<String>,
    pub dependencies: Vec<String>,
    pub value: Option<CellValue>,
}

/// POST /api/v1/deps - Cells a formula reads
pub async fn deps(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepsRequest>,
) -> impl IntoResponse {
    let export_dir = state.export_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> CalcResult<Option<DepsResponse>> {
        let workbook = load_workbook(&export_dir);
        let Some((sheet, coordinate, cell)) = workbook.cell(&req.cell) else {
            return Ok(None);
        };
        let key = qualify(sheet, &coordinate);
        let formula = cell.formula_text().map(str::to_string);
        let reads = formula
            .as_deref()
            .map(|f| dependencies(f, sheet))
            .unwrap_or_default();

        let output = run_workbook(workbook, &Overrides::new())?;
        let value = output.cells.get(&key).cloned();
        Ok(Some(DepsResponse {
            cell: key,
            formula,
            dependencies: reads,
            value,
        }))
    })
    .await;

    match flatten(result) {
        Ok(Some(response)) => (StatusCode::OK, Json(ApiResponse::ok(response))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<DepsResponse>::err("Cell not found")),
        ),
        Err(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<DepsResponse>::err(message)),
        ),
    }
}

fn flatten<T>(result: Result<CalcResult<T>, tokio::task::JoinError>) -> Result<T, String> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("Task failed: {}", e)),
    }
}
