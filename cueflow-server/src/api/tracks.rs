//! Track query API handlers

use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use cueflow_common::models::{BoundedRange, Track};
use cueflow_common::mood::Mood;
use cueflow_common::theory::{Camelot, MusicalKey};

use crate::error::ApiResult;
use crate::store::{SortField, SortOrder, TrackFilter};
use crate::AppState;

use super::types::{default_page, default_per_page, parse_list, Paginated, MAX_PER_PAGE};

/// GET /api/tracks query parameters
#[derive(Debug, Deserialize, Default)]
pub struct ListTracksQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    pub search: Option<String>,
    /// Comma-separated key list, e.g. `Am,C#`
    pub key: Option<String>,
    /// Comma-separated camelot list, e.g. `8A,9A`
    pub camelot: Option<String>,
    /// Comma-separated mood list
    pub mood: Option<String>,
    pub min_bpm: Option<f64>,
    pub max_bpm: Option<f64>,
    pub min_energy: Option<f64>,
    pub max_energy: Option<f64>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// GET /api/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<ListTracksQuery>,
) -> ApiResult<Json<Paginated<Track>>> {
    let filter = TrackFilter {
        search: query.search.clone(),
        keys: parse_list::<MusicalKey>(query.key.as_deref(), "key")?,
        camelots: parse_list::<Camelot>(query.camelot.as_deref(), "camelot")?,
        moods: parse_list::<Mood>(query.mood.as_deref(), "mood")?,
        bpm: range_from(query.min_bpm, query.max_bpm),
        energy: range_from(query.min_energy, query.max_energy),
    };

    let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
    let page = query.page.max(1);
    let (items, total) = state
        .store
        .list(&filter, query.sort_by, query.sort_order, page, per_page)
        .await;

    Ok(Json(Paginated {
        items,
        total,
        page,
        per_page,
    }))
}

fn range_from(min: Option<f64>, max: Option<f64>) -> Option<BoundedRange> {
    if min.is_none() && max.is_none() {
        return None;
    }
    Some(BoundedRange::new(
        min.unwrap_or(f64::MIN),
        max.unwrap_or(f64::MAX),
    ))
}

/// GET /api/tracks/{path}
///
/// `path` is the URL-encoded absolute file path; the full track including
/// the energy time series comes back.
pub async fn get_track(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<Track>> {
    let track = state.store.get_by_path(&PathBuf::from(path)).await?;
    Ok(Json(track))
}

/// GET /api/tracks/search/similar query parameters
#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub track_path: String,
    pub limit: Option<usize>,
    pub similarity_threshold: Option<f64>,
}

/// One similarity hit
#[derive(Debug, Serialize)]
pub struct SimilarTrack {
    pub track: Track,
    pub similarity: f64,
}

/// GET /api/tracks/search/similar
pub async fn similar_tracks(
    State(state): State<AppState>,
    Query(query): Query<SimilarQuery>,
) -> ApiResult<Json<Vec<SimilarTrack>>> {
    let hits = state
        .store
        .similar(
            &PathBuf::from(&query.track_path),
            query.limit.unwrap_or(10).clamp(1, 100),
            query.similarity_threshold.unwrap_or(0.0).clamp(0.0, 1.0),
        )
        .await?;
    Ok(Json(
        hits.into_iter()
            .map(|(track, similarity)| SimilarTrack { track, similarity })
            .collect(),
    ))
}

/// Build track query routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tracks", get(list_tracks))
        .route("/api/tracks/search/similar", get(similar_tracks))
        .route("/api/tracks/:path", get(get_track))
}
