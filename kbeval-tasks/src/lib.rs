//! # kbeval-tasks
//!
//! Lifecycle management and asynchronous execution of knowledge-base
//! retrieval evaluations.
//!
//! ## Features
//!
//! - Evaluation tasks with a guarded `Pending -> Running -> Completed | Failed`
//!   lifecycle
//! - A task store abstraction whose conditional updates serialize competing
//!   writers
//! - An orchestrator that runs the scoring pipeline on a spawned tokio task,
//!   with monotonic progress and cooperative cancellation
//! - Optional per-call retrieval timeout and bounded retry
//!
//! ## Example
//!
//! ```rust,ignore
//! use kbeval_tasks::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = EvaluationOrchestrator::new(
//!     Arc::new(datasets),
//!     Arc::new(knowledge_bases),
//!     Arc::new(retriever),
//!     Arc::new(InMemoryTaskStore::new()),
//! );
//!
//! let task = orchestrator
//!     .create_evaluation(CreateEvaluationRequest::new("ds-1", "kb-1"))
//!     .await?;
//! let outcome = orchestrator.run_evaluation(&task.id).await?.wait().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod task;

pub use collaborators::{
    Dataset, DatasetLookup, InMemoryDatasets, InMemoryKnowledgeBases, KnowledgeBase,
    KnowledgeBaseLookup, QaPair, Retrieval, Retriever,
};
pub use config::{OrchestratorConfig, Page, DEFAULT_PAGE_SIZE};
pub use error::{EvalResult, EvaluationError, ResourceKind};
pub use orchestrator::{
    CreateEvaluationRequest, EvaluationOrchestrator, RunHandle, RunOutcome, TaskPage,
    CANCELLED_REASON,
};
pub use retry::{with_retry, RetryPolicy};
pub use store::{InMemoryTaskStore, StoreError, TaskFilter, TaskStore};
pub use task::{EvaluationTask, StateError, TaskId, TaskStatus, MAX_RUNNING_PROGRESS};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        CreateEvaluationRequest, Dataset, DatasetLookup, EvalResult, EvaluationError,
        EvaluationOrchestrator, EvaluationTask, InMemoryDatasets, InMemoryKnowledgeBases,
        InMemoryTaskStore, KnowledgeBase, KnowledgeBaseLookup, OrchestratorConfig, QaPair,
        Retrieval, Retriever, RunOutcome, TaskStatus, TaskStore,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_builds_request() {
        let request = CreateEvaluationRequest::new("ds-1", "kb-1").chat_model("chat-1");
        assert_eq!(request.chat_model_id.as_deref(), Some("chat-1"));
        assert!(OrchestratorConfig::default().validate().is_ok());
    }
}
