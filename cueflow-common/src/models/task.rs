//! Background task state machine
//!
//! Tasks progress `pending → running → (completed | failed | cancelled)`,
//! with `pending → cancelled` as the only shortcut. Progress is monotonic
//! while running and the error list is append-only and bounded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::playlist::Playlist;

/// Most recent errors retained on a task
pub const MAX_TASK_ERRORS: usize = 50;

/// Background task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analysis,
    PlaylistGeneration,
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether `self → next` is an allowed transition
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }
}

/// One entry in a task's bounded error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    pub code: String,
    pub message: String,
}

/// Result of a completed analysis task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AnalysisSummary {
    pub total_files: usize,
    pub processed_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cache_hits: usize,
}

/// Result payload of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    Analysis(AnalysisSummary),
    Playlist(Playlist),
}

/// A background job and everything the status endpoint reports about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub state: TaskState,
    /// `[0, 100]`, monotonic non-decreasing while running
    pub progress: f64,
    /// Human-readable description of the current phase
    pub current_operation: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub processed_files: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_file: Option<String>,
    /// Total errors seen, including ones rotated out of `errors`
    pub error_count: usize,
    /// Most recent errors, capped at [`MAX_TASK_ERRORS`]
    pub errors: Vec<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: crate::ids::new_sortable_id(),
            kind,
            state: TaskState::Pending,
            progress: 0.0,
            current_operation: "Queued".to_string(),
            created_at: now,
            started_at: None,
            updated_at: now,
            ended_at: None,
            total_files: 0,
            processed_files: 0,
            current_file: None,
            error_count: 0,
            errors: Vec::new(),
            result: None,
        }
    }

    /// Move to `next`, enforcing the allowed transition set
    pub fn transition_to(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Conflict(format!(
                "illegal task transition {:?} -> {:?}",
                self.state, next
            )));
        }
        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        match next {
            TaskState::Running => self.started_at = Some(now),
            _ if next.is_terminal() => self.ended_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// Update counters and the derived percentage. Progress never decreases.
    pub fn update_progress(&mut self, processed: usize, total: usize, operation: impl Into<String>) {
        self.processed_files = processed.max(self.processed_files);
        self.total_files = total;
        let pct = if total > 0 {
            (self.processed_files as f64 / total as f64) * 100.0
        } else {
            self.progress
        };
        self.progress = self.progress.max(pct.min(100.0));
        self.current_operation = operation.into();
        self.updated_at = Utc::now();
    }

    /// Append an error, rotating out the oldest beyond the cap
    pub fn add_error(&mut self, error: TaskError) {
        self.error_count += 1;
        self.errors.push(error);
        if self.errors.len() > MAX_TASK_ERRORS {
            let excess = self.errors.len() - MAX_TASK_ERRORS;
            self.errors.drain(..excess);
        }
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        let mut task = Task::new(TaskKind::Analysis);
        task.transition_to(TaskState::Running).unwrap();
        task.transition_to(TaskState::Completed).unwrap();
        assert!(task.is_terminal());
        assert!(task.ended_at.is_some());
    }

    #[test]
    fn test_pending_can_cancel_directly() {
        let mut task = Task::new(TaskKind::Analysis);
        task.transition_to(TaskState::Cancelled).unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new(TaskKind::Analysis);
        task.transition_to(TaskState::Running).unwrap();
        task.transition_to(TaskState::Failed).unwrap();
        assert!(task.transition_to(TaskState::Running).is_err());
        assert!(task.transition_to(TaskState::Completed).is_err());
    }

    #[test]
    fn test_pending_cannot_complete() {
        let mut task = Task::new(TaskKind::PlaylistGeneration);
        assert!(task.transition_to(TaskState::Completed).is_err());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut task = Task::new(TaskKind::Analysis);
        task.transition_to(TaskState::Running).unwrap();
        task.update_progress(5, 10, "halfway");
        assert!((task.progress - 50.0).abs() < 1e-9);
        // A stale update with fewer processed files must not move it backwards
        task.update_progress(3, 10, "stale");
        assert!((task.progress - 50.0).abs() < 1e-9);
        task.update_progress(10, 10, "done");
        assert!((task.progress - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_list_is_bounded() {
        let mut task = Task::new(TaskKind::Analysis);
        for i in 0..(MAX_TASK_ERRORS + 10) {
            task.add_error(TaskError {
                path: Some(format!("/music/{i}.mp3")),
                code: "corrupt_file".to_string(),
                message: "bad header".to_string(),
            });
        }
        assert_eq!(task.errors.len(), MAX_TASK_ERRORS);
        assert_eq!(task.error_count, MAX_TASK_ERRORS + 10);
        // Oldest rotated out, most recent retained
        assert_eq!(
            task.errors.last().unwrap().path.as_deref(),
            Some(format!("/music/{}.mp3", MAX_TASK_ERRORS + 9).as_str())
        );
    }
}
