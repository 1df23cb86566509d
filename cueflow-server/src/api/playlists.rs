//! Playlist generation and export API handlers

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cueflow_common::models::{
    BoundedRange, CurveShape, Playlist, Preset, ScoringWeights, Task, TaskKind, TaskState,
};
use cueflow_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::export::{render, ExportFormat, ExportItem};
use crate::playlist::{find_preset, load_presets, GenerationParams, DEFAULT_BEAM_WIDTH};
use crate::services::generation::{playlist_of, run_generation, GenerationJob};
use crate::AppState;

use super::types::{error_from_code, generation_status_url};

/// Partial overrides applied on top of the chosen preset
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CustomRules {
    pub bpm_range: Option<BoundedRange>,
    pub energy_range: Option<BoundedRange>,
    pub target_energy_curve: Option<Vec<f64>>,
    pub energy_curve: Option<CurveShape>,
    pub harmony_strictness: Option<f64>,
    pub mood_consistency: Option<f64>,
    pub max_bpm_jump: Option<f64>,
    pub avoid_same_artist_window: Option<usize>,
    pub min_track_duration: Option<f64>,
    pub max_track_duration: Option<f64>,
    pub weights: Option<ScoringWeights>,
}

impl CustomRules {
    fn apply(self, mut preset: Preset) -> Preset {
        if let Some(v) = self.bpm_range {
            preset.bpm_range = v;
        }
        if let Some(v) = self.energy_range {
            preset.energy_range = v;
        }
        if self.target_energy_curve.is_some() {
            preset.target_energy_curve = self.target_energy_curve;
        }
        if let Some(v) = self.energy_curve {
            preset.energy_curve = Some(v);
        }
        if let Some(v) = self.harmony_strictness {
            preset.harmony_strictness = v;
        }
        if let Some(v) = self.mood_consistency {
            preset.mood_consistency = v;
        }
        if let Some(v) = self.max_bpm_jump {
            preset.max_bpm_jump = v;
        }
        if let Some(v) = self.avoid_same_artist_window {
            preset.avoid_same_artist_window = v;
        }
        if let Some(v) = self.min_track_duration {
            preset.min_track_duration = v;
        }
        if let Some(v) = self.max_track_duration {
            preset.max_track_duration = v;
        }
        if let Some(v) = self.weights {
            preset.weights = v;
        }
        preset
    }
}

/// POST /api/playlists/generate request
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Restrict the candidate pool to these paths
    pub track_file_paths: Option<Vec<PathBuf>>,
    pub preset_name: Option<String>,
    pub custom_rules: Option<CustomRules>,
    pub target_duration_minutes: Option<f64>,
    /// Seed track pinned to the first position
    pub seed: Option<PathBuf>,
    pub surprise: Option<f64>,
    pub beam_width: Option<usize>,
}

/// POST /api/playlists/generate response
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub task_id: Uuid,
    pub status_url: String,
}

/// POST /api/playlists/generate
pub async fn generate_playlist(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let preset_name = request.preset_name.as_deref().unwrap_or("peak_time");
    let mut preset = find_preset(state.store.presets_dir(), preset_name)?;
    if let Some(rules) = request.custom_rules {
        preset = rules.apply(preset);
    }
    preset.validate()?;

    if let Some(surprise) = request.surprise {
        if !(0.0..=1.0).contains(&surprise) {
            return Err(ApiError(Error::InvalidArgument(format!(
                "surprise out of range: {surprise}"
            ))));
        }
    }

    let params = GenerationParams {
        preset,
        target_duration_seconds: request.target_duration_minutes.unwrap_or(60.0).max(1.0) * 60.0,
        seed_track: request.seed,
        surprise: request.surprise.unwrap_or(0.0),
        beam_width: request.beam_width.unwrap_or(DEFAULT_BEAM_WIDTH).clamp(1, 64),
        // Replaced by the task id once the task exists.
        run_id: Uuid::nil(),
    };
    let job = GenerationJob {
        params,
        track_paths: request.track_file_paths,
        timeout: state.config.generation_timeout,
    };

    let store = Arc::clone(&state.store);
    let task_id = state
        .tasks
        .submit(TaskKind::PlaylistGeneration, move |ctx| {
            run_generation(ctx, store, job)
        })
        .await?;

    Ok(Json(GenerateResponse {
        task_id,
        status_url: generation_status_url(task_id),
    }))
}

/// GET /api/playlists/generate/{id}/status
pub async fn generation_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.status(task_id).await?))
}

/// GET /api/playlists/generate/{id}/result
///
/// The playlist once the task completed; 202 with a status stub while the
/// task is still live.
pub async fn generation_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Response> {
    let task = state.tasks.status(task_id).await?;
    match task.state {
        TaskState::Completed => {
            let playlist = playlist_of(&task).ok_or_else(|| {
                Error::Internal(format!("task {task_id} completed without a playlist"))
            })?;
            Ok(Json(playlist.clone()).into_response())
        }
        TaskState::Pending | TaskState::Running => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "task_id": task.id,
                "state": task.state,
                "progress": task.progress,
            })),
        )
            .into_response()),
        TaskState::Cancelled => Err(ApiError(Error::Conflict(format!(
            "task {task_id} was cancelled"
        )))),
        TaskState::Failed => {
            let cause = task.errors.last();
            let code = cause.map(|e| e.code.as_str()).unwrap_or("internal");
            let message = cause
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "generation failed".to_string());
            Err(ApiError(error_from_code(code, message)))
        }
    }
}

/// GET /api/playlists/presets
#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<Preset>,
}

pub async fn list_presets(State(state): State<AppState>) -> Json<PresetsResponse> {
    let presets = load_presets(state.store.presets_dir())
        .into_values()
        .collect();
    Json(PresetsResponse { presets })
}

/// POST /api/playlists/export request
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub playlist_data: Playlist,
    pub format_type: String,
    pub filename: String,
    #[serde(default = "super::types::default_true")]
    pub include_metadata: bool,
}

/// POST /api/playlists/export response
#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub filename: String,
    pub path: String,
    pub size_bytes: usize,
    pub format_type: ExportFormat,
}

/// POST /api/playlists/export
pub async fn export_playlist(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Json<ExportResponse>> {
    let format: ExportFormat = request.format_type.parse()?;

    let filename = request.filename.trim();
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(ApiError(Error::InvalidArgument(format!(
            "bad export filename: {:?}",
            request.filename
        ))));
    }
    let filename = if filename.ends_with(&format!(".{}", format.extension())) {
        filename.to_string()
    } else {
        format!("{filename}.{}", format.extension())
    };

    // Resolve whatever track detail the store still has; vanished tracks
    // export with their path only.
    let mut items = Vec::with_capacity(request.playlist_data.tracks.len());
    for entry in &request.playlist_data.tracks {
        let track = state.store.get_by_path(&entry.path).await.ok();
        items.push(ExportItem {
            path: entry.path.clone(),
            transition_score: entry.transition_score,
            track,
        });
    }

    let bytes = render(&request.playlist_data, &items, format, request.include_metadata)?;
    let target = state.store.exports_dir().join(&filename);
    std::fs::write(&target, &bytes).map_err(Error::Io)?;

    tracing::info!(
        file = %target.display(),
        format = %format,
        bytes = bytes.len(),
        "playlist exported"
    );
    Ok(Json(ExportResponse {
        filename,
        path: target.display().to_string(),
        size_bytes: bytes.len(),
        format_type: format,
    }))
}

/// Build playlist routes
pub fn playlist_routes() -> Router<AppState> {
    Router::new()
        .route("/api/playlists/generate", post(generate_playlist))
        .route("/api/playlists/generate/:task_id/status", get(generation_status))
        .route("/api/playlists/generate/:task_id/result", get(generation_result))
        .route("/api/playlists/presets", get(list_presets))
        .route("/api/playlists/export", post(export_playlist))
}
