//! Evaluation orchestrator.
//!
//! Creates evaluation tasks, runs the scoring pipeline for each one as a
//! spawned tokio task, and handles progress, cancellation and completion.
//!
//! At most one pipeline runs per task id. Two guards enforce this: an
//! in-process registry of active runs, and the store's compare-and-set on
//! `Pending -> Running`, which also covers other processes sharing the store.

use crate::collaborators::{DatasetLookup, KnowledgeBaseLookup, QaPair, Retrieval, Retriever};
use crate::config::{OrchestratorConfig, Page};
use crate::error::{EvalResult, EvaluationError, ResourceKind};
use crate::retry::with_retry;
use crate::store::{StoreError, TaskFilter, TaskStore};
use crate::task::{EvaluationTask, StateError, TaskId, TaskStatus, MAX_RUNNING_PROGRESS};
use futures::stream::{self, StreamExt};
use kbeval_metrics::{Aggregator, EvaluationResult, MetricInput, QueryOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure reason recorded when a run is cancelled by a caller.
pub const CANCELLED_REASON: &str = "cancelled by user";

/// Request to create an evaluation task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEvaluationRequest {
    /// Dataset of QA pairs.
    #[serde(rename = "datasetID")]
    pub dataset_id: String,
    /// Knowledge base to evaluate.
    #[serde(rename = "knowledgeBaseID")]
    pub knowledge_base_id: String,
    /// Chat model, if any.
    #[serde(rename = "chatModelID", default, skip_serializing_if = "Option::is_none")]
    pub chat_model_id: Option<String>,
    /// Rerank model, if any.
    #[serde(rename = "rerankModelID", default, skip_serializing_if = "Option::is_none")]
    pub rerank_model_id: Option<String>,
}

impl CreateEvaluationRequest {
    /// Create a request for a dataset and knowledge base.
    pub fn new(dataset_id: impl Into<String>, knowledge_base_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            knowledge_base_id: knowledge_base_id.into(),
            chat_model_id: None,
            rerank_model_id: None,
        }
    }

    /// Set the chat model.
    pub fn chat_model(mut self, id: impl Into<String>) -> Self {
        self.chat_model_id = Some(id.into());
        self
    }

    /// Set the rerank model.
    pub fn rerank_model(mut self, id: impl Into<String>) -> Self {
        self.rerank_model_id = Some(id.into());
        self
    }

    fn validate(&self) -> EvalResult<()> {
        if self.dataset_id.trim().is_empty() {
            return Err(EvaluationError::validation("datasetID is required"));
        }
        if self.knowledge_base_id.trim().is_empty() {
            return Err(EvaluationError::validation("knowledgeBaseID is required"));
        }
        Ok(())
    }
}

/// One page of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    /// Tasks on this page.
    pub tasks: Vec<EvaluationTask>,
    /// Total matching tasks across all pages.
    pub total: usize,
    /// Applied limit.
    pub limit: usize,
    /// Applied offset.
    pub offset: usize,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The task completed with this result.
    Completed(EvaluationResult),
    /// The task failed with this reason.
    Failed(String),
    /// The task was cancelled or deleted while running.
    Cancelled,
}

impl RunOutcome {
    /// Check if the run completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Handle to a spawned pipeline.
///
/// Dropping the handle does not stop the run; it keeps going in the
/// background and callers observe it through the task store.
#[derive(Debug)]
pub struct RunHandle {
    task_id: TaskId,
    handle: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// The task this run belongs to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Check if the pipeline has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pipeline to finish.
    pub async fn wait(self) -> EvalResult<RunOutcome> {
        self.handle
            .await
            .map_err(|e| EvaluationError::Other(anyhow::anyhow!("pipeline supervisor failed: {e}")))
    }
}

type ActiveRuns = Arc<Mutex<HashMap<TaskId, CancellationToken>>>;

/// Manages the lifecycle of evaluation tasks.
pub struct EvaluationOrchestrator {
    datasets: Arc<dyn DatasetLookup>,
    knowledge_bases: Arc<dyn KnowledgeBaseLookup>,
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn TaskStore>,
    config: OrchestratorConfig,
    active: ActiveRuns,
}

impl EvaluationOrchestrator {
    /// Create an orchestrator with the default configuration.
    pub fn new(
        datasets: Arc<dyn DatasetLookup>,
        knowledge_bases: Arc<dyn KnowledgeBaseLookup>,
        retriever: Arc<dyn Retriever>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            datasets,
            knowledge_bases,
            retriever,
            store,
            config: OrchestratorConfig::default(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the configuration after validating it.
    pub fn with_config(mut self, config: OrchestratorConfig) -> EvalResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get a reference to the task store.
    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    /// Check if a pipeline for `task_id` is running in this process.
    pub fn is_active(&self, task_id: &str) -> bool {
        self.active.lock().contains_key(task_id)
    }

    /// Validate the referenced knowledge base and dataset, then persist a
    /// new pending task.
    pub async fn create_evaluation(
        &self,
        request: CreateEvaluationRequest,
    ) -> EvalResult<EvaluationTask> {
        request.validate()?;

        if self
            .knowledge_bases
            .get_by_id(&request.knowledge_base_id)
            .await?
            .is_none()
        {
            return Err(EvaluationError::not_found(
                ResourceKind::KnowledgeBase,
                request.knowledge_base_id,
            ));
        }
        if self.datasets.get_by_id(&request.dataset_id).await?.is_none() {
            return Err(EvaluationError::not_found(
                ResourceKind::Dataset,
                request.dataset_id,
            ));
        }

        let task = EvaluationTask::new(request.dataset_id, request.knowledge_base_id)
            .with_chat_model(request.chat_model_id)
            .with_rerank_model(request.rerank_model_id);
        self.store.create(&task).await?;

        info!(
            task_id = %task.id,
            dataset_id = %task.dataset_id,
            knowledge_base_id = %task.knowledge_base_id,
            "Created evaluation task"
        );
        Ok(task)
    }

    /// Start the scoring pipeline for a pending task.
    ///
    /// Returns as soon as the pipeline is spawned. Fails with a state error
    /// if the task is not pending or a run for it is already active.
    pub async fn run_evaluation(&self, task_id: &str) -> EvalResult<RunHandle> {
        let task = self.get_evaluation_task(task_id).await?;

        let token = CancellationToken::new();
        {
            let mut active = self.active.lock();
            if active.contains_key(task_id) {
                return Err(StateError {
                    task_id: task_id.to_string(),
                    from: TaskStatus::Running,
                    to: TaskStatus::Running,
                }
                .into());
            }
            active.insert(task_id.to_string(), token.clone());
        }

        let task = match self
            .store
            .transition(&task.id, TaskStatus::Pending, TaskStatus::Running)
            .await
        {
            Ok(task) => task,
            Err(e) => {
                self.active.lock().remove(task_id);
                return Err(e.into());
            }
        };

        info!(task_id = %task.id, "Starting evaluation pipeline");

        let pipeline = Arc::new(Pipeline {
            datasets: Arc::clone(&self.datasets),
            retriever: Arc::clone(&self.retriever),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        });
        let active = Arc::clone(&self.active);
        let id = task.id.clone();

        let handle = tokio::spawn(async move {
            let worker = tokio::spawn({
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.execute(task, token).await }
            });

            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(task_id = %id, error = %e, "Evaluation pipeline aborted");
                    pipeline
                        .fail(&id, &format!("pipeline aborted: {e}"))
                        .await
                }
            };
            active.lock().remove(&id);
            outcome
        });

        Ok(RunHandle {
            task_id: task_id.to_string(),
            handle,
        })
    }

    /// Cancel a running task. The task becomes `Failed` with its last
    /// progress, and any in-flight retrieval for it is abandoned.
    pub async fn cancel_evaluation(&self, task_id: &str) -> EvalResult<EvaluationTask> {
        let task = self
            .store
            .mark_failed(task_id, CANCELLED_REASON)
            .await?;

        if let Some(token) = self.active.lock().get(task_id) {
            token.cancel();
        }

        info!(task_id = %task_id, progress = task.progress, "Cancelled evaluation task");
        Ok(task)
    }

    /// Write progress for a running task, or fail it.
    ///
    /// Only `Running` tasks are accepted, so this never starts a task.
    /// Progress is held below 100; completion is reached only through the
    /// pipeline, which attaches the result in the same write.
    pub async fn update_task_progress(
        &self,
        task_id: &str,
        progress: i64,
        status: TaskStatus,
    ) -> EvalResult<EvaluationTask> {
        let progress = u8::try_from(progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                EvaluationError::validation(format!(
                    "progress must be within [0, 100], got {progress}"
                ))
            })?;
        if status == TaskStatus::Completed {
            return Err(EvaluationError::validation(
                "completion requires a result and cannot be set through a progress update",
            ));
        }

        let task = self
            .store
            .update_progress(task_id, progress, status)
            .await?;
        if task.is_terminal() {
            if let Some(token) = self.active.lock().get(task_id) {
                token.cancel();
            }
        }
        Ok(task)
    }

    /// Get a task by ID.
    pub async fn get_evaluation_task(&self, task_id: &str) -> EvalResult<EvaluationTask> {
        self.store
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| EvaluationError::not_found(ResourceKind::Task, task_id))
    }

    /// List tasks for a knowledge base, newest first.
    pub async fn list_evaluation_tasks(
        &self,
        knowledge_base_id: &str,
        limit: i64,
        offset: i64,
    ) -> EvalResult<TaskPage> {
        let page = Page::normalize(limit, offset, self.config.default_page_size);
        let filter = TaskFilter::all().knowledge_base(knowledge_base_id);
        let (tasks, total) = self.store.list(&filter, page.limit, page.offset).await?;
        Ok(TaskPage {
            tasks,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// All tasks in a status.
    pub async fn get_tasks_by_status(&self, status: TaskStatus) -> EvalResult<Vec<EvaluationTask>> {
        Ok(self.store.get_by_status(status).await?)
    }

    /// Delete a task. A run in progress for it is stopped.
    pub async fn delete_evaluation_task(&self, task_id: &str) -> EvalResult<()> {
        self.store.delete(task_id).await?;
        if let Some(token) = self.active.lock().get(task_id) {
            token.cancel();
        }
        info!(task_id = %task_id, "Deleted evaluation task");
        Ok(())
    }
}

impl std::fmt::Debug for EvaluationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The scoring pipeline for one task.
struct Pipeline {
    datasets: Arc<dyn DatasetLookup>,
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn TaskStore>,
    config: OrchestratorConfig,
}

impl Pipeline {
    async fn execute(&self, task: EvaluationTask, token: CancellationToken) -> RunOutcome {
        let result = match self.score(&task, &token).await {
            Ok(result) => result,
            Err(EvaluationError::Cancelled) => {
                info!(task_id = %task.id, "Evaluation pipeline stopped after cancellation");
                return RunOutcome::Cancelled;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Evaluation pipeline failed");
                return self.fail(&task.id, &e.to_string()).await;
            }
        };

        match self.store.update_result(&task.id, result.clone()).await {
            Ok(_) => {
                info!(
                    task_id = %task.id,
                    queries = result.total_queries,
                    precision = result.precision,
                    recall = result.recall,
                    f1 = result.f1_score,
                    "Evaluation completed"
                );
                RunOutcome::Completed(result)
            }
            Err(StoreError::Transition(_)) | Err(StoreError::NotFound(_)) => {
                info!(task_id = %task.id, "Evaluation finished after task was cancelled or deleted");
                RunOutcome::Cancelled
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to store evaluation result");
                self.fail(&task.id, &format!("failed to store result: {e}"))
                    .await
            }
        }
    }

    /// Record a failure. If the task already left `Running`, someone else
    /// decided its fate first.
    async fn fail(&self, task_id: &str, reason: &str) -> RunOutcome {
        match self.store.mark_failed(task_id, reason).await {
            Ok(_) => RunOutcome::Failed(reason.to_string()),
            Err(StoreError::Transition(_)) | Err(StoreError::NotFound(_)) => RunOutcome::Cancelled,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to record task failure");
                RunOutcome::Failed(reason.to_string())
            }
        }
    }

    async fn score(
        &self,
        task: &EvaluationTask,
        token: &CancellationToken,
    ) -> EvalResult<EvaluationResult> {
        let dataset = self
            .datasets
            .get_by_id(&task.dataset_id)
            .await?
            .ok_or_else(|| EvaluationError::not_found(ResourceKind::Dataset, &task.dataset_id))?;

        let total = dataset.qa_pairs.len();
        debug!(task_id = %task.id, queries = total, "Scoring dataset");

        let mut outcomes = Vec::with_capacity(total);
        let mut last_written = task.progress;
        // Collected up front so the spawned future does not hold the mapping closure.
        let queries: Vec<_> = dataset
            .qa_pairs
            .iter()
            .map(|pair| self.evaluate_pair(&task.knowledge_base_id, pair, token))
            .collect();
        let mut pending = stream::iter(queries).buffer_unordered(self.config.concurrency.max(1));

        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome?);

            // 100 is written together with the result.
            let progress = ((outcomes.len() * 100) / total).min(usize::from(MAX_RUNNING_PROGRESS)) as u8;
            if progress >= last_written.saturating_add(self.config.progress_step) {
                if token.is_cancelled() {
                    return Err(EvaluationError::Cancelled);
                }
                match self
                    .store
                    .update_progress(&task.id, progress, TaskStatus::Running)
                    .await
                {
                    Ok(_) => {
                        debug!(task_id = %task.id, progress, "Progress updated");
                        last_written = progress;
                    }
                    Err(StoreError::Transition(_)) | Err(StoreError::NotFound(_)) => {
                        return Err(EvaluationError::Cancelled)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if token.is_cancelled() {
            return Err(EvaluationError::Cancelled);
        }
        Ok(Aggregator::new(self.config.aggregation).aggregate(&outcomes))
    }

    async fn evaluate_pair(
        &self,
        knowledge_base_id: &str,
        pair: &QaPair,
        token: &CancellationToken,
    ) -> EvalResult<QueryOutcome> {
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EvaluationError::Cancelled),
            retrieval = self.retrieve(knowledge_base_id, &pair.question) => retrieval,
        };
        let retrieval = attempt
            .map_err(|e| EvaluationError::Retrieval(format!("question {}: {e:#}", pair.id)))?;

        let input = MetricInput::new(pair.ground_truth.clone(), retrieval.ids);
        Ok(QueryOutcome::evaluate(
            &input,
            self.config.ndcg_k,
            retrieval.latency,
        ))
    }

    async fn retrieve(&self, knowledge_base_id: &str, question: &str) -> anyhow::Result<Retrieval> {
        let timeout = self.config.retrieval_timeout;
        with_retry(&self.config.retry, |_| async move {
            let call = self.retriever.retrieve(knowledge_base_id, question);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("retrieval timed out after {limit:?}")),
                },
                None => call.await,
            }
        })
        .await
    }
}
