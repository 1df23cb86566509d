//! Analysis workflow API handlers
//!
//! POST /api/analysis/start, status/cancel per task, and the cache
//! maintenance endpoints. The scan runs at submission time so the start
//! response can carry `total_files`; the worker pool runs in the background
//! task.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cueflow_common::models::{Task, TaskKind};
use cueflow_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::services::analysis::{run_analysis, AnalysisJob};
use crate::services::scanner::{ScanRequest, Scanner, SUPPORTED_EXTENSIONS};
use crate::services::worker_pool::WorkerPoolConfig;
use crate::store::CleanupReport;
use crate::AppState;

use super::types::{analysis_status_url, default_true};

/// POST /api/analysis/start request
#[derive(Debug, Deserialize)]
pub struct StartAnalysisRequest {
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub file_paths: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub overwrite_cache: bool,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// POST /api/analysis/start response
#[derive(Debug, Serialize)]
pub struct StartAnalysisResponse {
    pub task_id: Uuid,
    pub total_files: usize,
    pub status_url: String,
}

/// POST /api/analysis/start
///
/// Scans synchronously, then hands the candidate list to a background task.
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(request): Json<StartAnalysisRequest>,
) -> ApiResult<Json<StartAnalysisResponse>> {
    if request.directories.is_empty() && request.file_paths.is_empty() {
        return Err(ApiError(Error::InvalidArgument(
            "at least one of directories or file_paths is required".to_string(),
        )));
    }

    let scanner = Scanner::new(
        state.config.min_file_size_kb,
        state.config.max_file_size_mb,
    );
    let scan_request = ScanRequest {
        directories: request.directories,
        file_paths: request.file_paths,
        recursive: request.recursive,
        include_patterns: request.include_patterns,
        exclude_patterns: request.exclude_patterns,
    };
    let outcome = tokio::task::spawn_blocking(move || scanner.scan(&scan_request))
        .await
        .map_err(|err| ApiError(Error::Internal(format!("scan task failed: {err}"))))??;

    let total_files = outcome.files.len();
    let job = AnalysisJob {
        files: outcome.files,
        warnings: outcome.warnings,
        roots: outcome.roots,
    };
    let pool_config = WorkerPoolConfig {
        max_workers: state.config.max_workers,
        analysis_timeout: state.config.analysis_timeout,
        overwrite_cache: request.overwrite_cache,
    };
    let store = Arc::clone(&state.store);
    let extractor = Arc::clone(&state.extractor);
    let task_id = state
        .tasks
        .submit(TaskKind::Analysis, move |ctx| {
            run_analysis(ctx, store, extractor, pool_config, job)
        })
        .await?;

    Ok(Json(StartAnalysisResponse {
        task_id,
        total_files,
        status_url: analysis_status_url(task_id),
    }))
}

/// GET /api/analysis/{id}/status
pub async fn analysis_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.status(task_id).await?))
}

/// POST /api/analysis/{id}/cancel
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.cancel(task_id).await?))
}

/// GET /api/analysis/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<crate::store::StoreStats> {
    Json(state.store.stats().await)
}

/// POST /api/analysis/cache/cleanup request
#[derive(Debug, Deserialize, Default)]
pub struct CleanupRequest {
    pub older_than_days: Option<i64>,
    pub max_size_gb: Option<f64>,
}

/// POST /api/analysis/cache/cleanup
pub async fn cache_cleanup(
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> ApiResult<Json<CleanupReport>> {
    if request.older_than_days.is_none() && request.max_size_gb.is_none() {
        return Err(ApiError(Error::InvalidArgument(
            "one of older_than_days or max_size_gb is required".to_string(),
        )));
    }
    let report = state
        .store
        .cleanup(request.older_than_days, request.max_size_gb)
        .await?;
    Ok(Json(report))
}

/// POST /api/analysis/cache/clear response
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed_entries: usize,
}

/// POST /api/analysis/cache/clear
pub async fn cache_clear(State(state): State<AppState>) -> ApiResult<Json<ClearResponse>> {
    let removed_entries = state.store.clear().await?;
    Ok(Json(ClearResponse { removed_entries }))
}

/// GET /api/analysis/formats
#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<&'static str>,
}

pub async fn supported_formats() -> Json<FormatsResponse> {
    Json(FormatsResponse {
        formats: SUPPORTED_EXTENSIONS.to_vec(),
    })
}

/// Build analysis workflow routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analysis/start", post(start_analysis))
        .route("/api/analysis/:task_id/status", get(analysis_status))
        .route("/api/analysis/:task_id/cancel", post(cancel_analysis))
        .route("/api/analysis/cache/stats", get(cache_stats))
        .route("/api/analysis/cache/cleanup", post(cache_cleanup))
        .route("/api/analysis/cache/clear", post(cache_clear))
        .route("/api/analysis/formats", get(supported_formats))
}
