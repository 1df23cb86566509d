//! Background task lifecycle management
//!
//! Owns the map of active tasks and mediates between API callers and the
//! long-running work. Each task's state lives behind its own lock and is
//! mutated by exactly one runner; readers get snapshots. A supervisor wraps
//! every runner so a panic becomes a task failure with class `internal`
//! instead of taking anything else down. A background sweeper collects
//! terminal tasks after their retention window.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cueflow_common::events::{EventBus, TaskEvent};
use cueflow_common::models::{Task, TaskError, TaskKind, TaskResult, TaskState};
use cueflow_common::{Error, Result};

/// Default global ceiling on concurrently live (non-terminal) tasks
pub const DEFAULT_TASK_CEILING: usize = 8;

/// Retention for completed tasks
fn completed_retention() -> Duration {
    Duration::hours(24)
}

/// Retention for failed and cancelled tasks
fn failed_retention() -> Duration {
    Duration::hours(1)
}

/// Handle a runner uses to drive its own task
#[derive(Clone)]
pub struct TaskContext {
    task: Arc<RwLock<Task>>,
    pub cancel: CancellationToken,
    events: EventBus,
}

impl TaskContext {
    pub async fn id(&self) -> Uuid {
        self.task.read().await.id
    }

    pub async fn snapshot(&self) -> Task {
        self.task.read().await.clone()
    }

    /// `pending → running`. Fails when the task was cancelled before start.
    pub async fn begin(&self) -> Result<()> {
        let mut task = self.task.write().await;
        task.transition_to(TaskState::Running)?;
        self.events.emit(TaskEvent::TaskStarted {
            task_id: task.id,
            kind: task.kind,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn update_progress(
        &self,
        processed: usize,
        total: usize,
        operation: impl Into<String>,
    ) {
        let mut task = self.task.write().await;
        task.update_progress(processed, total, operation);
        self.events.emit(TaskEvent::TaskProgress {
            task_id: task.id,
            progress: task.progress,
            processed: task.processed_files,
            total: task.total_files,
            current_operation: task.current_operation.clone(),
            timestamp: Utc::now(),
        });
    }

    pub async fn set_current_file(&self, file: Option<String>) {
        self.task.write().await.current_file = file;
    }

    pub async fn add_error(&self, error: TaskError) {
        self.task.write().await.add_error(error);
    }

    /// `running → completed` with the result payload
    pub async fn complete(&self, result: TaskResult) -> Result<()> {
        let mut task = self.task.write().await;
        task.transition_to(TaskState::Completed)?;
        task.progress = 100.0;
        task.result = Some(result);
        Ok(())
    }

    /// `running → failed` with a recorded cause
    pub async fn fail(&self, code: &str, message: impl Into<String>) -> Result<()> {
        let mut task = self.task.write().await;
        let message = message.into();
        task.add_error(TaskError {
            path: None,
            code: code.to_string(),
            message: message.clone(),
        });
        task.current_operation = message;
        task.transition_to(TaskState::Failed)?;
        Ok(())
    }

    /// `running → cancelled` (or no-op when already terminal)
    pub async fn mark_cancelled(&self) -> Result<()> {
        let mut task = self.task.write().await;
        if task.is_terminal() {
            return Ok(());
        }
        task.current_operation = "Cancelled".to_string();
        task.transition_to(TaskState::Cancelled)
    }
}

struct TaskHandle {
    task: Arc<RwLock<Task>>,
    cancel: CancellationToken,
}

/// Task lifecycle manager
pub struct TaskManager {
    tasks: RwLock<HashMap<Uuid, TaskHandle>>,
    ceiling: usize,
    events: EventBus,
}

impl TaskManager {
    pub fn new(ceiling: usize, events: EventBus) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            ceiling: ceiling.max(1),
            events,
        })
    }

    /// Submit a background task. Never blocks: when the ceiling is reached
    /// the submission is rejected with `busy`.
    ///
    /// The runner owns all state transitions up to its terminal state; the
    /// supervisor only steps in for panics and non-terminal exits.
    pub async fn submit<F, Fut>(&self, kind: TaskKind, runner: F) -> Result<Uuid>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        {
            let tasks = self.tasks.read().await;
            let mut live = 0usize;
            for handle in tasks.values() {
                if !handle.task.read().await.is_terminal() {
                    live += 1;
                }
            }
            if live >= self.ceiling {
                return Err(Error::Busy(format!(
                    "task ceiling reached ({live}/{})",
                    self.ceiling
                )));
            }
        }

        let task = Task::new(kind);
        let id = task.id;
        let shared = Arc::new(RwLock::new(task));
        let cancel = CancellationToken::new();
        let ctx = TaskContext {
            task: shared.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
        };

        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(
                id,
                TaskHandle {
                    task: shared.clone(),
                    cancel,
                },
            );
        }

        let events = self.events.clone();
        let supervisor_ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(runner(ctx)).await;
            match outcome {
                Ok(Ok(())) => {
                    force_terminal(&supervisor_ctx, "runner exited without a terminal state").await;
                }
                Ok(Err(err)) => {
                    tracing::error!(task_id = %id, error = ?err, "task runner failed");
                    force_failed(&supervisor_ctx, &format!("{err:#}")).await;
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(task_id = %id, "task runner panicked");
                    force_failed(&supervisor_ctx, "task panicked").await;
                }
                Err(join_err) => {
                    tracing::error!(task_id = %id, error = %join_err, "task runner aborted");
                    force_failed(&supervisor_ctx, "task aborted").await;
                }
            }

            let final_state = supervisor_ctx.snapshot().await.state;
            events.emit(TaskEvent::TaskFinished {
                task_id: id,
                state: final_state,
                timestamp: Utc::now(),
            });
        });

        tracing::info!(task_id = %id, kind = ?kind, "task submitted");
        Ok(id)
    }

    /// Snapshot a task's current state
    pub async fn status(&self, id: Uuid) -> Result<Task> {
        let tasks = self.tasks.read().await;
        let handle = tasks
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("task not found: {id}")))?;
        let snapshot = handle.task.read().await.clone();
        Ok(snapshot)
    }

    /// Cooperatively cancel. Idempotent: cancelling a terminal task returns
    /// its snapshot unchanged.
    pub async fn cancel(&self, id: Uuid) -> Result<Task> {
        let tasks = self.tasks.read().await;
        let handle = tasks
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("task not found: {id}")))?;

        handle.cancel.cancel();
        {
            let mut task = handle.task.write().await;
            // A pending task has no runner making progress yet; finish it
            // here so cancellation is immediate.
            if task.state == TaskState::Pending {
                task.current_operation = "Cancelled".to_string();
                let _ = task.transition_to(TaskState::Cancelled);
            }
        }
        let snapshot = handle.task.read().await.clone();
        tracing::info!(task_id = %id, state = ?snapshot.state, "task cancel requested");
        Ok(snapshot)
    }

    /// Cancel everything still live (shutdown path)
    pub async fn cancel_all(&self) {
        let tasks = self.tasks.read().await;
        for handle in tasks.values() {
            handle.cancel.cancel();
        }
    }

    /// Number of tasks not yet terminal
    pub async fn active_count(&self) -> usize {
        let tasks = self.tasks.read().await;
        let mut live = 0;
        for handle in tasks.values() {
            if !handle.task.read().await.is_terminal() {
                live += 1;
            }
        }
        live
    }

    /// Drop terminal tasks older than their retention window
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut doomed = Vec::new();
        {
            let tasks = self.tasks.read().await;
            for (id, handle) in tasks.iter() {
                let task = handle.task.read().await;
                let Some(ended_at) = task.ended_at else {
                    continue;
                };
                let retention = match task.state {
                    TaskState::Completed => completed_retention(),
                    TaskState::Failed | TaskState::Cancelled => failed_retention(),
                    _ => continue,
                };
                if now - ended_at > retention {
                    doomed.push(*id);
                }
            }
        }
        if doomed.is_empty() {
            return;
        }
        let mut tasks = self.tasks.write().await;
        for id in &doomed {
            tasks.remove(id);
        }
        tracing::debug!(swept = doomed.len(), "retention sweep");
    }

    /// Run the retention sweeper until the token is cancelled
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => manager.sweep().await,
                }
            }
        })
    }
}

/// Ensure a task the runner abandoned ends up terminal
async fn force_terminal(ctx: &TaskContext, reason: &str) {
    let snapshot = ctx.snapshot().await;
    if !snapshot.is_terminal() {
        tracing::warn!(task_id = %snapshot.id, reason, "forcing task to failed");
        force_failed(ctx, reason).await;
    }
}

/// Drive a non-terminal task to `failed`, stepping through `running` when it
/// never left `pending`.
async fn force_failed(ctx: &TaskContext, message: &str) {
    let mut task = ctx.task.write().await;
    if task.is_terminal() {
        return;
    }
    if task.state == TaskState::Pending {
        let _ = task.transition_to(TaskState::Running);
    }
    task.add_error(TaskError {
        path: None,
        code: "internal".to_string(),
        message: message.to_string(),
    });
    task.current_operation = message.to_string();
    let _ = task.transition_to(TaskState::Failed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<TaskManager> {
        TaskManager::new(2, EventBus::new(64))
    }

    async fn wait_terminal(manager: &TaskManager, id: Uuid) -> Task {
        for _ in 0..200 {
            let task = manager.status(id).await.unwrap();
            if task.is_terminal() {
                return task;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("task {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_successful_task_completes() {
        let manager = manager();
        let id = manager
            .submit(TaskKind::Analysis, |ctx| async move {
                ctx.begin().await?;
                ctx.update_progress(3, 3, "working").await;
                ctx.complete(TaskResult::Analysis(Default::default())).await?;
                Ok(())
            })
            .await
            .unwrap();

        let task = wait_terminal(&manager, id).await;
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.progress, 100.0);
        assert!(task.result.is_some());
    }

    #[tokio::test]
    async fn test_panicking_task_fails_as_internal() {
        let manager = manager();
        let id = manager
            .submit(TaskKind::Analysis, |ctx| async move {
                ctx.begin().await?;
                panic!("boom");
            })
            .await
            .unwrap();

        let task = wait_terminal(&manager, id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.errors.last().unwrap().code, "internal");
    }

    #[tokio::test]
    async fn test_ceiling_rejects_with_busy() {
        let manager = manager();
        for _ in 0..2 {
            manager
                .submit(TaskKind::Analysis, |ctx| async move {
                    ctx.begin().await?;
                    ctx.cancel.cancelled().await;
                    ctx.mark_cancelled().await?;
                    Ok(())
                })
                .await
                .unwrap();
        }

        let err = manager
            .submit(TaskKind::Analysis, |_ctx| async move { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "busy");

        manager.cancel_all().await;
    }

    #[tokio::test]
    async fn test_cancel_pending_is_immediate() {
        let manager = manager();
        let id = manager
            .submit(TaskKind::Analysis, |ctx| async move {
                // Simulate a runner that is slow to start
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                if ctx.cancel.is_cancelled() {
                    ctx.mark_cancelled().await?;
                    return Ok(());
                }
                ctx.begin().await?;
                ctx.complete(TaskResult::Analysis(Default::default())).await?;
                Ok(())
            })
            .await
            .unwrap();

        let snapshot = manager.cancel(id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Cancelled);
        assert_eq!(snapshot.processed_files, 0);

        // Idempotent: cancelling again returns the same terminal snapshot.
        let again = manager.cancel(id).await.unwrap();
        assert_eq!(again.state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let manager = manager();
        let missing = Uuid::now_v7();
        assert_eq!(manager.status(missing).await.unwrap_err().code(), "not_found");
        assert_eq!(manager.cancel(missing).await.unwrap_err().code(), "not_found");
    }

    #[tokio::test]
    async fn test_sweep_honours_retention() {
        let manager = manager();
        let id = manager
            .submit(TaskKind::Analysis, |ctx| async move {
                ctx.begin().await?;
                ctx.complete(TaskResult::Analysis(Default::default())).await?;
                Ok(())
            })
            .await
            .unwrap();
        wait_terminal(&manager, id).await;

        // Fresh terminal task survives a sweep.
        manager.sweep().await;
        assert!(manager.status(id).await.is_ok());

        // Backdate far past retention; next sweep collects it.
        {
            let tasks = manager.tasks.read().await;
            let handle = tasks.get(&id).unwrap();
            handle.task.write().await.ended_at = Some(Utc::now() - Duration::hours(48));
        }
        manager.sweep().await;
        assert_eq!(manager.status(id).await.unwrap_err().code(), "not_found");
    }
}
