//! cueflow-server library interface
//!
//! Exposes the application state and router assembly so integration tests
//! can drive the full REST surface in-process.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod playlist;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cueflow_common::EventBus;

use crate::config::Config;
use crate::extractor::FeatureExtractor;
use crate::services::TaskManager;
use crate::store::Store;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Content-addressed feature store
    pub store: Arc<Store>,
    /// Background task lifecycle manager
    pub tasks: Arc<TaskManager>,
    /// Extraction boundary; tests inject stubs here
    pub extractor: Arc<dyn FeatureExtractor>,
    /// Task lifecycle event bus feeding the SSE stream
    pub events: EventBus,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<Store>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let events = EventBus::new(256);
        let tasks = TaskManager::new(config.task_ceiling, events.clone());
        Self {
            config,
            store,
            tasks,
            extractor,
            events,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .merge(api::track_routes())
        .merge(api::playlist_routes())
        .merge(api::sse_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
