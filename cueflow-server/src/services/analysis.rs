//! Analysis task orchestration
//!
//! Drives one analysis task end to end: seed the scan warnings, feed the
//! worker pool, fold worker events into task progress, prune vanished paths,
//! and land the task in the right terminal state. The scan itself already
//! happened at submission time so the API could report `total_files`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use cueflow_common::models::{AnalysisSummary, TaskError, TaskResult};

use crate::extractor::FeatureExtractor;
use crate::services::scanner::ScanWarning;
use crate::services::task_manager::TaskContext;
use crate::services::worker_pool::{FileOutcome, WorkerEvent, WorkerPool, WorkerPoolConfig};
use crate::store::Store;

/// Everything an analysis task needs, resolved at submission
pub struct AnalysisJob {
    pub files: Vec<PathBuf>,
    pub warnings: Vec<ScanWarning>,
    pub roots: Vec<PathBuf>,
}

/// Run one analysis task to a terminal state.
pub async fn run_analysis(
    ctx: TaskContext,
    store: Arc<Store>,
    extractor: Arc<dyn FeatureExtractor>,
    pool_config: WorkerPoolConfig,
    job: AnalysisJob,
) -> anyhow::Result<()> {
    if ctx.cancel.is_cancelled() {
        ctx.mark_cancelled().await?;
        return Ok(());
    }
    if ctx.begin().await.is_err() {
        // Lost the race with a cancel; the task is already terminal.
        return Ok(());
    }

    let task_id = ctx.id().await;
    for warning in &job.warnings {
        ctx.add_error(TaskError {
            path: Some(warning.path.display().to_string()),
            code: "io_error".to_string(),
            message: warning.message.clone(),
        })
        .await;
    }

    let total = job.files.len();
    tracing::info!(task_id = %task_id, total_files = total, "analysis started");
    ctx.update_progress(0, total, "Analysing files").await;

    if total == 0 {
        ctx.complete(TaskResult::Analysis(AnalysisSummary::default()))
            .await?;
        return Ok(());
    }

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let pool = WorkerPool::new(Arc::clone(&store), extractor, pool_config);
    let pool_files = job.files.clone();
    let pool_cancel = ctx.cancel.clone();
    let pool_task =
        tokio::spawn(async move { pool.run(pool_files, pool_cancel, events_tx).await });

    let mut summary = AnalysisSummary {
        total_files: total,
        ..AnalysisSummary::default()
    };
    while let Some(event) = events_rx.recv().await {
        match event {
            WorkerEvent::Started { path } => {
                ctx.set_current_file(Some(path.display().to_string())).await;
            }
            WorkerEvent::Finished { path, outcome } => {
                summary.processed_files += 1;
                match outcome {
                    FileOutcome::CacheHit => {
                        summary.cache_hits += 1;
                        summary.succeeded += 1;
                    }
                    FileOutcome::Analysed => summary.succeeded += 1,
                    FileOutcome::Failed { code, message } => {
                        summary.failed += 1;
                        ctx.add_error(TaskError {
                            path: Some(path.display().to_string()),
                            code,
                            message,
                        })
                        .await;
                    }
                }
                ctx.update_progress(
                    summary.processed_files,
                    total,
                    format!("Analysed {}/{} files", summary.processed_files, total),
                )
                .await;
            }
        }
    }
    pool_task
        .await
        .map_err(|err| anyhow::anyhow!("worker pool task failed: {err}"))?;
    ctx.set_current_file(None).await;

    if ctx.cancel.is_cancelled() && summary.processed_files < total {
        tracing::info!(
            task_id = %task_id,
            processed = summary.processed_files,
            total,
            "analysis cancelled"
        );
        ctx.mark_cancelled().await?;
        return Ok(());
    }

    // Library maintenance: paths that vanished since the last scan drop out
    // of the index; their entries stay for the retention window.
    let seen: HashSet<PathBuf> = job.files.iter().cloned().collect();
    let pruned = store.prune_missing(&job.roots, &seen).await;
    if pruned > 0 {
        tracing::info!(task_id = %task_id, pruned, "removed vanished paths from index");
    }

    if summary.failed == total {
        tracing::warn!(task_id = %task_id, total, "every file failed analysis");
        ctx.fail("internal", format!("analysis failed for all {total} files"))
            .await?;
        return Ok(());
    }

    tracing::info!(
        task_id = %task_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cache_hits = summary.cache_hits,
        "analysis completed"
    );
    ctx.complete(TaskResult::Analysis(summary)).await?;
    Ok(())
}
