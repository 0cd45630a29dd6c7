//! External collaborators consumed by the orchestrator.
//!
//! Datasets, knowledge bases and the retrieval step live outside this crate.
//! The traits here are the minimal contract the orchestrator needs; the
//! in-memory implementations back tests and local runs.

use async_trait::async_trait;
use kbeval_metrics::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A question with its annotated ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaPair {
    /// Pair identifier.
    pub id: String,
    /// The question sent to retrieval.
    pub question: String,
    /// Reference answer, if annotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Relevance groups, one per annotation source.
    pub ground_truth: Vec<Vec<DocId>>,
}

impl QaPair {
    /// Create a pair with a single relevance group.
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        relevant: impl IntoIterator<Item = impl Into<DocId>>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            answer: None,
            ground_truth: vec![relevant.into_iter().map(Into::into).collect()],
        }
    }

    /// Add another annotation source's relevance group.
    pub fn with_group(mut self, relevant: impl IntoIterator<Item = impl Into<DocId>>) -> Self {
        self.ground_truth
            .push(relevant.into_iter().map(Into::into).collect());
        self
    }

    /// Set the reference answer.
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }
}

/// A dataset of QA pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Dataset identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// QA pairs in evaluation order.
    #[serde(default)]
    pub qa_pairs: Vec<QaPair>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            qa_pairs: Vec::new(),
        }
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a pair.
    pub fn pair(mut self, pair: QaPair) -> Self {
        self.qa_pairs.push(pair);
        self
    }

    /// Get the number of pairs.
    pub fn len(&self) -> usize {
        self.qa_pairs.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.qa_pairs.is_empty()
    }
}

/// A knowledge base that retrieval runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Knowledge base identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl KnowledgeBase {
    /// Create a knowledge base record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// What a single retrieval call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    /// Retrieved document identifiers, highest rank first.
    pub ids: Vec<DocId>,
    /// Time the retrieval took.
    pub latency: Duration,
}

impl Retrieval {
    /// Create a retrieval result.
    pub fn new(ids: impl IntoIterator<Item = impl Into<DocId>>, latency: Duration) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            latency,
        }
    }
}

/// Dataset lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatasetLookup: Send + Sync {
    /// Get a dataset by ID, or `None` if it does not exist.
    async fn get_by_id(&self, dataset_id: &str) -> anyhow::Result<Option<Dataset>>;
}

/// Knowledge base lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeBaseLookup: Send + Sync {
    /// Get a knowledge base by ID, or `None` if it does not exist.
    async fn get_by_id(&self, knowledge_base_id: &str) -> anyhow::Result<Option<KnowledgeBase>>;
}

/// The search step whose quality is being evaluated.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve ranked document identifiers for a question.
    async fn retrieve(&self, knowledge_base_id: &str, question: &str) -> anyhow::Result<Retrieval>;
}

/// In-memory dataset lookup.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDatasets {
    datasets: Arc<RwLock<HashMap<String, Dataset>>>,
}

impl InMemoryDatasets {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a dataset.
    pub async fn insert(&self, dataset: Dataset) {
        self.datasets
            .write()
            .await
            .insert(dataset.id.clone(), dataset);
    }
}

#[async_trait]
impl DatasetLookup for InMemoryDatasets {
    async fn get_by_id(&self, dataset_id: &str) -> anyhow::Result<Option<Dataset>> {
        Ok(self.datasets.read().await.get(dataset_id).cloned())
    }
}

/// In-memory knowledge base lookup.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKnowledgeBases {
    knowledge_bases: Arc<RwLock<HashMap<String, KnowledgeBase>>>,
}

impl InMemoryKnowledgeBases {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a knowledge base.
    pub async fn insert(&self, knowledge_base: KnowledgeBase) {
        self.knowledge_bases
            .write()
            .await
            .insert(knowledge_base.id.clone(), knowledge_base);
    }
}

#[async_trait]
impl KnowledgeBaseLookup for InMemoryKnowledgeBases {
    async fn get_by_id(&self, knowledge_base_id: &str) -> anyhow::Result<Option<KnowledgeBase>> {
        Ok(self.knowledge_bases.read().await.get(knowledge_base_id).cloned())
    }
}
