//! Evaluation task records and their lifecycle.
//!
//! A task moves `Pending -> Running -> {Completed, Failed}`. The two terminal
//! states accept no further transitions and no progress writes.

use chrono::{DateTime, Utc};
use kbeval_metrics::EvaluationResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a task.
pub type TaskId = String;

/// Highest progress a task can report before it completes.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Status of an evaluation task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet started.
    #[default]
    Pending,
    /// Scoring pipeline is executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Failed or cancelled.
    Failed,
}

impl TaskStatus {
    /// Check if no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Check if moving to `next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// An illegal lifecycle transition was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Task {task_id} cannot move from {from} to {to}")]
pub struct StateError {
    /// The task.
    pub task_id: TaskId,
    /// Status at the time of the request.
    pub from: TaskStatus,
    /// Requested status.
    pub to: TaskStatus,
}

/// A single evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationTask {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Dataset of QA pairs to evaluate.
    #[serde(rename = "datasetID")]
    pub dataset_id: String,
    /// Knowledge base to retrieve from.
    #[serde(rename = "knowledgeBaseID")]
    pub knowledge_base_id: String,
    /// Chat model used by the retrieval pipeline, if any.
    #[serde(rename = "chatModelID", skip_serializing_if = "Option::is_none")]
    pub chat_model_id: Option<String>,
    /// Rerank model used by the retrieval pipeline, if any.
    #[serde(rename = "rerankModelID", skip_serializing_if = "Option::is_none")]
    pub rerank_model_id: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// Progress percentage in `[0, 100]`.
    pub progress: u8,
    /// Final result, present only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    /// Failure reason, if the task failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

impl EvaluationTask {
    /// Create a pending task.
    pub fn new(dataset_id: impl Into<String>, knowledge_base_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dataset_id: dataset_id.into(),
            knowledge_base_id: knowledge_base_id.into(),
            chat_model_id: None,
            rerank_model_id: None,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the chat model.
    pub fn with_chat_model(mut self, model_id: Option<String>) -> Self {
        self.chat_model_id = model_id;
        self
    }

    /// Set the rerank model.
    pub fn with_rerank_model(mut self, model_id: Option<String>) -> Self {
        self.rerank_model_id = model_id;
        self
    }

    /// Check if the task is pending.
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Check if the task is running.
    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Check if the task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(to) {
            return Err(self.state_error(to));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn state_error(&self, to: TaskStatus) -> StateError {
        StateError {
            task_id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// Mark the task as running.
    pub fn start(&mut self) -> Result<(), StateError> {
        self.transition(TaskStatus::Running)
    }

    /// Mark the task as completed and attach its result.
    pub fn complete(&mut self, result: EvaluationResult) -> Result<(), StateError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100;
        self.result = Some(result);
        Ok(())
    }

    /// Mark the task as failed. Progress is left as last recorded.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        self.transition(TaskStatus::Failed)?;
        self.result = None;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Record progress. Lower values than the current one are ignored.
    ///
    /// Only running tasks accept progress, and it stays below 100 until the
    /// task completes with a result.
    pub fn record_progress(&mut self, progress: u8) -> Result<(), StateError> {
        if !self.is_running() {
            return Err(self.state_error(TaskStatus::Running));
        }
        self.progress = self.progress.max(progress.min(MAX_RUNNING_PROGRESS));
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn running_task() -> EvaluationTask {
        let mut task = EvaluationTask::new("ds-1", "kb-1");
        task.start().unwrap();
        task
    }

    #[test]
    fn test_task_creation() {
        let task = EvaluationTask::new("ds-1", "kb-1");
        assert!(task.is_pending());
        assert_eq!(task.progress, 0);
        assert!(task.result.is_none());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = running_task();
        task.record_progress(40).unwrap();

        task.complete(EvaluationResult::default()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.result.is_some());
    }

    #[test]
    fn test_fail_preserves_progress() {
        let mut task = running_task();
        task.record_progress(60).unwrap();

        task.fail("cancelled").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.progress, 60);
        assert!(task.result.is_none());
        assert_eq!(task.error.as_deref(), Some("cancelled"));
    }

    #[rstest]
    #[case(TaskStatus::Pending, TaskStatus::Running, true)]
    #[case(TaskStatus::Running, TaskStatus::Completed, true)]
    #[case(TaskStatus::Running, TaskStatus::Failed, true)]
    #[case(TaskStatus::Pending, TaskStatus::Failed, false)]
    #[case(TaskStatus::Pending, TaskStatus::Completed, false)]
    #[case(TaskStatus::Running, TaskStatus::Running, false)]
    #[case(TaskStatus::Completed, TaskStatus::Failed, false)]
    #[case(TaskStatus::Completed, TaskStatus::Running, false)]
    #[case(TaskStatus::Failed, TaskStatus::Running, false)]
    #[case(TaskStatus::Failed, TaskStatus::Completed, false)]
    fn test_transition_table(
        #[case] from: TaskStatus,
        #[case] to: TaskStatus,
        #[case] legal: bool,
    ) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn test_illegal_transition_does_not_mutate() {
        let mut task = EvaluationTask::new("ds-1", "kb-1");
        let before = task.clone();

        let err = task.fail("nope").unwrap_err();
        assert_eq!(err.from, TaskStatus::Pending);
        assert_eq!(err.to, TaskStatus::Failed);
        assert_eq!(task, before);
    }

    #[test]
    fn test_terminal_rejects_everything() {
        let mut task = running_task();
        task.complete(EvaluationResult::default()).unwrap();

        assert!(task.start().is_err());
        assert!(task.fail("late").is_err());
        assert!(task.record_progress(10).is_err());
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut task = running_task();
        task.record_progress(50).unwrap();
        task.record_progress(20).unwrap();
        assert_eq!(task.progress, 50);
        task.record_progress(250).unwrap();
        assert_eq!(task.progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_progress_rejected_while_pending() {
        let mut task = EvaluationTask::new("ds-1", "kb-1");
        let err = task.record_progress(30).unwrap_err();
        assert_eq!(err.from, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.is_pending());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_task_serializes_wire_names() {
        let task = EvaluationTask::new("ds-1", "kb-1");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["datasetID"], "ds-1");
        assert_eq!(json["knowledgeBaseID"], "kb-1");
        assert!(json.get("result").is_none());
    }
}
