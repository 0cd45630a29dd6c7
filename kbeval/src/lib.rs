//! # kbeval - Retrieval Evaluation for Knowledge Bases
//!
//! kbeval measures how well a knowledge base's retrieval step finds the
//! documents a question actually needs. Given a dataset of questions with
//! annotated ground truth, it runs retrieval for each question, scores the
//! ranked results, and folds the scores into a task-level report.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kbeval::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = EvaluationOrchestrator::new(
//!         Arc::new(datasets),
//!         Arc::new(knowledge_bases),
//!         Arc::new(my_retriever),
//!         Arc::new(InMemoryTaskStore::new()),
//!     );
//!
//!     let task = orchestrator
//!         .create_evaluation(CreateEvaluationRequest::new("faq", "docs"))
//!         .await?;
//!     let outcome = orchestrator.run_evaluation(&task.id).await?.wait().await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`metrics`] - Precision, Recall, F1, MRR and NDCG plus aggregation
//! - [`tasks`] - Task lifecycle, task store and the async orchestrator
//!
//! ## Scoring a single query
//!
//! ```
//! use kbeval::prelude::*;
//!
//! let input = MetricInput::single(vec!["d1", "d2", "d3"], vec!["d1", "d4", "d2"]);
//! let scores = MetricScores::compute(&input, 0);
//! assert!((scores.precision - 2.0 / 3.0).abs() < 1e-9);
//! assert_eq!(scores.mrr, 1.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Metric computation and aggregation.
pub use kbeval_metrics as metrics;
/// Evaluation task lifecycle and orchestration.
pub use kbeval_tasks as tasks;

pub use kbeval_metrics::{
    AggregationPolicy, Aggregator, DocId, EvaluationResult, Metric, MetricInput, MetricScores,
    MetricSet, QueryOutcome,
};
pub use kbeval_tasks::{
    CreateEvaluationRequest, EvalResult, EvaluationError, EvaluationOrchestrator, EvaluationTask,
    OrchestratorConfig, RetryPolicy, RunHandle, RunOutcome, TaskPage, TaskStatus, TaskStore,
};

/// Prelude for common imports.
///
/// ```
/// use kbeval::prelude::*;
/// ```
pub mod prelude {
    pub use kbeval_metrics::prelude::*;
    pub use kbeval_metrics::MetricScores;
    pub use kbeval_tasks::prelude::*;
    pub use kbeval_tasks::{RetryPolicy, RunHandle};
}

/// Returns the version of kbeval.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoRetriever;

    #[async_trait]
    impl Retriever for EchoRetriever {
        async fn retrieve(&self, _kb: &str, question: &str) -> anyhow::Result<Retrieval> {
            // Questions are "q:<doc>" and retrieve that doc plus a miss.
            let doc = question.trim_start_matches("q:");
            Ok(Retrieval::new([doc, "miss"], Duration::from_millis(2)))
        }
    }

    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }

    #[tokio::test]
    async fn test_full_evaluation_through_facade() {
        let datasets = InMemoryDatasets::new();
        datasets
            .insert(
                Dataset::new("faq")
                    .pair(QaPair::new("1", "q:a", ["a"]))
                    .pair(QaPair::new("2", "q:b", ["c"])),
            )
            .await;
        let knowledge_bases = InMemoryKnowledgeBases::new();
        knowledge_bases.insert(KnowledgeBase::new("docs", "Docs")).await;

        let orchestrator = EvaluationOrchestrator::new(
            Arc::new(datasets),
            Arc::new(knowledge_bases),
            Arc::new(EchoRetriever),
            Arc::new(InMemoryTaskStore::new()),
        );

        let task = orchestrator
            .create_evaluation(CreateEvaluationRequest::new("faq", "docs"))
            .await
            .unwrap();
        let outcome = orchestrator
            .run_evaluation(&task.id)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        let result = match outcome {
            RunOutcome::Completed(result) => result,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(result.total_correct, 1);
        assert_eq!(result.total_wrong, 1);
        assert!((result.precision - 0.25).abs() < 1e-9);
        assert!((result.recall - 0.5).abs() < 1e-9);
    }
}
