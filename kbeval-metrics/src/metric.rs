//! The metric trait and metric collections.

use crate::input::{DocId, MetricInput};
use crate::scorers::{F1, Mrr, Ndcg, Precision, Recall};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A retrieval-quality metric over a single query.
///
/// Implementations are pure: the same input always yields the same score,
/// and the score is always within `[0, 1]`.
pub trait Metric<Id = DocId>: Send + Sync {
    /// Stable lowercase identifier used in reports.
    fn name(&self) -> &str;

    /// Score a single query.
    fn compute(&self, input: &MetricInput<Id>) -> f64;
}

/// Boxed metric for dynamic dispatch.
pub type BoxedMetric<Id = DocId> = Box<dyn Metric<Id>>;

/// A score tagged with the metric that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedScore {
    /// Metric name.
    pub metric: String,
    /// Score in `[0, 1]`.
    pub score: f64,
}

impl NamedScore {
    /// Create a new named score.
    pub fn new(metric: impl Into<String>, score: f64) -> Self {
        Self {
            metric: metric.into(),
            score,
        }
    }
}

impl fmt::Display for NamedScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:.4}", self.metric, self.score)
    }
}

/// Ordered collection of metrics run against the same input.
pub struct MetricSet<Id = DocId> {
    metrics: Vec<BoxedMetric<Id>>,
}

impl<Id> Default for MetricSet<Id> {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
        }
    }
}

impl<Id> MetricSet<Id> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric.
    pub fn with_metric<M: Metric<Id> + 'static>(mut self, metric: M) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    /// Score an input with every metric, in insertion order.
    pub fn compute(&self, input: &MetricInput<Id>) -> Vec<NamedScore> {
        self.metrics
            .iter()
            .map(|m| NamedScore::new(m.name(), m.compute(input)))
            .collect()
    }

    /// Names of the metrics in this set.
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    /// Get the number of metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl<Id: Eq + Hash + 'static> MetricSet<Id> {
    /// Precision, recall, F1, MRR and NDCG with the given cutoff.
    pub fn standard(ndcg_k: i64) -> Self {
        Self::new()
            .with_metric(Precision)
            .with_metric(Recall)
            .with_metric(F1)
            .with_metric(Mrr)
            .with_metric(Ndcg::new(ndcg_k))
    }
}

impl<Id> fmt::Debug for MetricSet<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSet")
            .field("metrics", &self.names())
            .finish()
    }
}
