//! Offline retrieval evaluation.
//!
//! Scores a toy keyword retriever over an in-memory corpus, entirely
//! offline. Shows task creation, a run with progress polling, the final
//! report, and cancelling a second run.
//!
//! Run with:
//! ```bash
//! RUST_LOG=kbeval_tasks=debug cargo run -p kbeval --example offline_eval
//! ```

use async_trait::async_trait;
use kbeval::prelude::*;
use kbeval::tasks::StoreError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
concurrency: 2
ndcg_k: 3
progress_step: 10
retrieval_timeout: 2000
retry:
  max_retries: 1
  initial_backoff: 50
"#;

/// Ranks documents by how many question words they contain.
struct KeywordRetriever {
    corpus: HashMap<&'static str, &'static str>,
    top_k: usize,
    delay: Duration,
}

impl KeywordRetriever {
    fn new(delay: Duration) -> Self {
        let corpus = HashMap::from([
            ("doc-borrow", "the borrow checker enforces ownership and lifetimes"),
            ("doc-async", "async functions return futures polled by an executor"),
            ("doc-tokio", "tokio is an async runtime with tasks timers and io"),
            ("doc-serde", "serde derives serialization for structs and enums"),
            ("doc-traits", "traits define shared behaviour and enable generics"),
            ("doc-errors", "errors are values returned through result and the question mark"),
        ]);
        Self {
            corpus,
            top_k: 3,
            delay,
        }
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn retrieve(&self, _knowledge_base_id: &str, question: &str) -> anyhow::Result<Retrieval> {
        let started = Instant::now();
        tokio::time::sleep(self.delay).await;

        let words: Vec<String> = question
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();

        let mut ranked: Vec<(&str, usize)> = self
            .corpus
            .iter()
            .map(|(id, text)| (*id, words.iter().filter(|w| text.contains(w.as_str())).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(self.top_k);

        Ok(Retrieval::new(
            ranked.into_iter().map(|(id, _)| id),
            started.elapsed(),
        ))
    }
}

fn rust_faq() -> Dataset {
    Dataset::new("rust-faq")
        .with_name("Rust FAQ")
        .pair(QaPair::new(
            "q1",
            "What does the borrow checker enforce?",
            ["doc-borrow"],
        ))
        .pair(QaPair::new(
            "q2",
            "Which runtime executes async futures?",
            ["doc-tokio", "doc-async"],
        ))
        .pair(
            QaPair::new("q3", "How do I derive serialization for structs?", ["doc-serde"])
                .with_answer("Use serde's derive macros."),
        )
        .pair(
            QaPair::new("q4", "How are errors propagated?", ["doc-errors"])
                .with_group(["doc-traits"]),
        )
        .pair(QaPair::new(
            "q5",
            "What is a lifetime parameter?",
            ["doc-borrow"],
        ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let datasets = InMemoryDatasets::new();
    datasets.insert(rust_faq()).await;
    let knowledge_bases = InMemoryKnowledgeBases::new();
    knowledge_bases
        .insert(KnowledgeBase::new("rust-book", "The Rust Book"))
        .await;

    let config = OrchestratorConfig::from_yaml_str(CONFIG)?;
    info!(?config, "Loaded configuration");

    let orchestrator = EvaluationOrchestrator::new(
        Arc::new(datasets.clone()),
        Arc::new(knowledge_bases.clone()),
        Arc::new(KeywordRetriever::new(Duration::from_millis(30))),
        Arc::new(InMemoryTaskStore::new()),
    )
    .with_config(config)?;

    println!("=== Evaluating keyword retriever ===\n");

    let task = orchestrator
        .create_evaluation(CreateEvaluationRequest::new("rust-faq", "rust-book"))
        .await?;
    let handle = orchestrator.run_evaluation(&task.id).await?;

    while !handle.is_finished() {
        let current = orchestrator.get_evaluation_task(&task.id).await?;
        println!("  status={} progress={}%", current.status, current.progress);
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    match handle.wait().await? {
        RunOutcome::Completed(result) => println!("\n{result}"),
        RunOutcome::Failed(reason) => println!("\nEvaluation failed: {reason}"),
        RunOutcome::Cancelled => println!("\nEvaluation cancelled"),
    }

    println!("=== Cancelling a slow run ===\n");

    let slow = EvaluationOrchestrator::new(
        Arc::new(datasets),
        Arc::new(knowledge_bases),
        Arc::new(KeywordRetriever::new(Duration::from_secs(30))),
        Arc::new(InMemoryTaskStore::new()),
    );
    let task = slow
        .create_evaluation(CreateEvaluationRequest::new("rust-faq", "rust-book"))
        .await?;
    let handle = slow.run_evaluation(&task.id).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancelled = slow.cancel_evaluation(&task.id).await?;
    println!(
        "  status={} progress={}% error={}",
        cancelled.status,
        cancelled.progress,
        cancelled.error.as_deref().unwrap_or("-")
    );
    println!("  outcome={:?}", handle.wait().await?);

    match slow.cancel_evaluation(&task.id).await {
        Err(EvaluationError::State(e)) => println!("  second cancel rejected: {e}"),
        Err(EvaluationError::Store(StoreError::Backend(e))) => println!("  store failure: {e}"),
        other => println!("  unexpected: {other:?}"),
    }

    let page = slow.list_evaluation_tasks("rust-book", 0, 0).await?;
    println!("\n{} task(s) recorded for rust-book", page.total);

    Ok(())
}
