//! Task store abstraction.
//!
//! Every status change goes through a conditional single-row update, so the
//! store is the serialization point for concurrent writers. A cancellation
//! racing with natural completion resolves to whichever write lands first;
//! the other sees a [`StoreError::Transition`].

use crate::task::{EvaluationTask, StateError, TaskId, TaskStatus};
use async_trait::async_trait;
use kbeval_metrics::EvaluationResult;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Task was not found.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// Task already exists.
    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    /// The conditional update did not match the stored status.
    #[error(transparent)]
    Transition(#[from] StateError),

    /// Completion was requested without a result.
    #[error("Task {0} cannot complete without a result")]
    MissingResult(TaskId),

    /// Store backend error.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Only tasks against this knowledge base.
    pub knowledge_base_id: Option<String>,
    /// Only tasks over this dataset.
    pub dataset_id: Option<String>,
    /// Only tasks in this status.
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    /// Match every task.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a knowledge base.
    pub fn knowledge_base(mut self, id: impl Into<String>) -> Self {
        self.knowledge_base_id = Some(id.into());
        self
    }

    /// Restrict to a dataset.
    pub fn dataset(mut self, id: impl Into<String>) -> Self {
        self.dataset_id = Some(id.into());
        self
    }

    /// Restrict to a status.
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Check if a task passes the filter.
    pub fn matches(&self, task: &EvaluationTask) -> bool {
        self.knowledge_base_id
            .as_ref()
            .map_or(true, |id| &task.knowledge_base_id == id)
            && self
                .dataset_id
                .as_ref()
                .map_or(true, |id| &task.dataset_id == id)
            && self.status.map_or(true, |s| task.status == s)
    }
}

/// Storage for evaluation tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save a new task.
    async fn create(&self, task: &EvaluationTask) -> Result<(), StoreError>;

    /// Get a task by ID.
    async fn get_by_id(&self, task_id: &str) -> Result<Option<EvaluationTask>, StoreError>;

    /// Move a task from `from` to `to`, failing if the stored status is not `from`.
    async fn transition(
        &self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<EvaluationTask, StoreError>;

    /// Record progress on a running task, or fail it when `status` is
    /// `Failed`. Progress never decreases and stays below 100; tasks in any
    /// other status are rejected.
    async fn update_progress(
        &self,
        task_id: &str,
        progress: u8,
        status: TaskStatus,
    ) -> Result<EvaluationTask, StoreError>;

    /// Complete a running task with its result.
    async fn update_result(
        &self,
        task_id: &str,
        result: EvaluationResult,
    ) -> Result<EvaluationTask, StoreError>;

    /// Fail a running task, keeping its last progress.
    async fn mark_failed(&self, task_id: &str, reason: &str)
        -> Result<EvaluationTask, StoreError>;

    /// List tasks matching `filter`, newest first, with the unpaged total.
    async fn list(
        &self,
        filter: &TaskFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EvaluationTask>, usize), StoreError>;

    /// Delete a task.
    async fn delete(&self, task_id: &str) -> Result<(), StoreError>;

    /// All tasks in a given status.
    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<EvaluationTask>, StoreError>;
}

/// In-memory task store.
///
/// Suitable for development and testing. Data is lost when the process
/// terminates.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, EvaluationTask>>>,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    async fn modify<F>(&self, task_id: &str, f: F) -> Result<EvaluationTask, StoreError>
    where
        F: FnOnce(&mut EvaluationTask) -> Result<(), StoreError> + Send,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        // Apply to a copy so a rejected update leaves the row untouched.
        let mut updated = task.clone();
        f(&mut updated)?;
        *task = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &EvaluationTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_by_id(&self, task_id: &str) -> Result<Option<EvaluationTask>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn transition(
        &self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<EvaluationTask, StoreError> {
        self.modify(task_id, |task| {
            let mismatch = StateError {
                task_id: task.id.clone(),
                from: task.status,
                to,
            };
            if task.status != from {
                return Err(mismatch.into());
            }
            match to {
                TaskStatus::Running => task.start()?,
                TaskStatus::Failed => task.fail("failed")?,
                TaskStatus::Completed => return Err(StoreError::MissingResult(task.id.clone())),
                TaskStatus::Pending => return Err(mismatch.into()),
            }
            Ok(())
        })
        .await
    }

    async fn update_progress(
        &self,
        task_id: &str,
        progress: u8,
        status: TaskStatus,
    ) -> Result<EvaluationTask, StoreError> {
        self.modify(task_id, |task| {
            let mismatch = StateError {
                task_id: task.id.clone(),
                from: task.status,
                to: status,
            };
            // Only the run that owns the task writes through here.
            if !task.is_running() {
                return Err(mismatch.into());
            }
            match status {
                TaskStatus::Running => task.record_progress(progress)?,
                TaskStatus::Failed => task.fail("failed")?,
                TaskStatus::Completed => return Err(StoreError::MissingResult(task.id.clone())),
                TaskStatus::Pending => return Err(mismatch.into()),
            }
            Ok(())
        })
        .await
    }

    async fn update_result(
        &self,
        task_id: &str,
        result: EvaluationResult,
    ) -> Result<EvaluationTask, StoreError> {
        self.modify(task_id, |task| {
            task.complete(result)?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(
        &self,
        task_id: &str,
        reason: &str,
    ) -> Result<EvaluationTask, StoreError> {
        self.modify(task_id, |task| {
            task.fail(reason)?;
            Ok(())
        })
        .await
    }

    async fn list(
        &self,
        filter: &TaskFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EvaluationTask>, usize), StoreError> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<EvaluationTask> = tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        // Newest first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn delete(&self, task_id: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.remove(task_id).is_none() {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<EvaluationTask>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<EvaluationTask> = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
