//! Playlist generation task orchestration
//!
//! Generation runs as a background task like analysis does: load the
//! candidate pool from the store, run the beam search on the blocking pool,
//! and land the task in a terminal state. Cancellation is observed between
//! beam steps, so abort latency is bounded by a single extension pass. The
//! whole task sits under the generation timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cueflow_common::models::{Task, TaskResult, Track};

use crate::playlist::{generate, GenerationParams};
use crate::services::task_manager::TaskContext;
use crate::store::Store;

/// One generation request, resolved at submission
pub struct GenerationJob {
    pub params: GenerationParams,
    /// Restrict the pool to these paths when present
    pub track_paths: Option<Vec<PathBuf>>,
    pub timeout: Duration,
}

/// Run one playlist generation task to a terminal state.
pub async fn run_generation(
    ctx: TaskContext,
    store: Arc<Store>,
    job: GenerationJob,
) -> anyhow::Result<()> {
    if ctx.cancel.is_cancelled() {
        ctx.mark_cancelled().await?;
        return Ok(());
    }
    if ctx.begin().await.is_err() {
        return Ok(());
    }

    let task_id = ctx.id().await;
    ctx.update_progress(0, 0, "loading_tracks").await;

    let pool: Vec<Track> = match &job.track_paths {
        None => store.all_tracks().await,
        Some(paths) => {
            let mut tracks = Vec::new();
            for path in paths {
                match store.get_by_path(path).await {
                    Ok(track) => tracks.push(track),
                    // A vanished or unanalysed track drops out silently;
                    // regeneration over a shrunken library is not an error.
                    Err(err) => {
                        tracing::debug!(
                            task_id = %task_id,
                            path = %path.display(),
                            error = %err,
                            "skipping pool track"
                        );
                    }
                }
            }
            tracks
        }
    };

    tracing::info!(
        task_id = %task_id,
        pool = pool.len(),
        preset = %job.params.preset.name,
        "playlist generation started"
    );
    ctx.update_progress(0, 0, "generating").await;

    let cancel = ctx.cancel.clone();
    let mut params = job.params.clone();
    // Seed the surprise RNG with the task id so a client replaying the same
    // request against the same task sees the same sequence.
    params.run_id = task_id;
    let search = tokio::task::spawn_blocking(move || generate(&pool, &params, &cancel));

    let outcome = match tokio::time::timeout(job.timeout, search).await {
        Ok(joined) => joined.map_err(|err| anyhow::anyhow!("generation task failed: {err}"))?,
        Err(_) => {
            ctx.cancel.cancel();
            ctx.fail(
                "timeout",
                format!("generation exceeded {} s budget", job.timeout.as_secs()),
            )
            .await?;
            return Ok(());
        }
    };

    let playlist = match outcome {
        Ok(Some(playlist)) => playlist,
        Ok(None) => {
            ctx.mark_cancelled().await?;
            return Ok(());
        }
        Err(err) => {
            ctx.fail(err.code(), err.to_string()).await?;
            return Ok(());
        }
    };

    tracing::info!(
        task_id = %task_id,
        tracks = playlist.tracks.len(),
        truncated = playlist.metadata.truncated,
        empty = playlist.metadata.empty,
        "playlist generation completed"
    );
    ctx.complete(TaskResult::Playlist(playlist)).await?;
    Ok(())
}

/// Extract the playlist from a completed generation task, if present
pub fn playlist_of(task: &Task) -> Option<&cueflow_common::models::Playlist> {
    match &task.result {
        Some(TaskResult::Playlist(playlist)) => Some(playlist),
        _ => None,
    }
}
