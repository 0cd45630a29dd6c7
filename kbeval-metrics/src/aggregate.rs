//! Per-query outcomes and their aggregation into a task-level result.

use crate::input::MetricInput;
use crate::metric::Metric;
use crate::result::EvaluationResult;
use crate::scorers::{F1, Mrr, Ndcg, Precision, Recall};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::time::Duration;

/// Scores of the five standard metrics for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    /// Precision.
    pub precision: f64,
    /// Recall.
    pub recall: f64,
    /// F1.
    pub f1: f64,
    /// Reciprocal rank.
    pub mrr: f64,
    /// NDCG at the configured cutoff.
    pub ndcg: f64,
}

impl MetricScores {
    /// Run every standard metric on an input.
    pub fn compute<Id: Eq + Hash>(input: &MetricInput<Id>, ndcg_k: i64) -> Self {
        Self {
            precision: Precision.compute(input),
            recall: Recall.compute(input),
            f1: F1.compute(input),
            mrr: Mrr.compute(input),
            ndcg: Ndcg::new(ndcg_k).compute(input),
        }
    }
}

/// Raw counts behind precision and recall, kept for pooled aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCounts {
    /// Length of the retrieved list.
    pub retrieved: usize,
    /// Relevant retrieved entries, duplicates counted.
    pub retrieved_hits: usize,
    /// Size of the effective relevant set.
    pub relevant: usize,
    /// Distinct relevant identifiers retrieved.
    pub distinct_hits: usize,
}

impl HitCounts {
    /// Count hits for an input.
    pub fn from_input<Id: Eq + Hash>(input: &MetricInput<Id>) -> Self {
        let relevant = input.relevant_set();
        Self {
            retrieved: input.retrieved.len(),
            retrieved_hits: input.retrieved_hits(&relevant),
            relevant: relevant.len(),
            distinct_hits: input.distinct_hits(&relevant),
        }
    }
}

/// Everything recorded about a single evaluated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Per-query metric scores.
    pub scores: MetricScores,
    /// Hit counts.
    pub counts: HitCounts,
    /// Retrieval latency.
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    /// Whether the query is judged correct.
    pub correct: bool,
}

impl QueryOutcome {
    /// Score an input.
    ///
    /// A query is correct when at least one relevant document was retrieved.
    pub fn evaluate<Id: Eq + Hash>(input: &MetricInput<Id>, ndcg_k: i64, latency: Duration) -> Self {
        let scores = MetricScores::compute(input, ndcg_k);
        let counts = HitCounts::from_input(input);
        Self {
            correct: counts.distinct_hits > 0,
            scores,
            counts,
            latency,
        }
    }
}

/// How per-query precision and recall become task-level numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Arithmetic mean of per-query scores.
    #[default]
    MacroAverage,
    /// Precision and recall computed once over summed hit counts.
    Pooled,
}

/// Folds query outcomes into an [`EvaluationResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    policy: AggregationPolicy,
}

impl Aggregator {
    /// Create an aggregator with the given policy.
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// Aggregate outcomes. An empty slice yields an all-zero result.
    pub fn aggregate(&self, outcomes: &[QueryOutcome]) -> EvaluationResult {
        if outcomes.is_empty() {
            return EvaluationResult::default();
        }

        let n = outcomes.len() as f64;
        let mean = |f: fn(&QueryOutcome) -> f64| outcomes.iter().map(f).sum::<f64>() / n;

        let (precision, recall, f1_score) = match self.policy {
            AggregationPolicy::MacroAverage => (
                mean(|o| o.scores.precision),
                mean(|o| o.scores.recall),
                mean(|o| o.scores.f1),
            ),
            AggregationPolicy::Pooled => {
                let totals = outcomes.iter().fold(HitCounts::default(), |acc, o| HitCounts {
                    retrieved: acc.retrieved + o.counts.retrieved,
                    retrieved_hits: acc.retrieved_hits + o.counts.retrieved_hits,
                    relevant: acc.relevant + o.counts.relevant,
                    distinct_hits: acc.distinct_hits + o.counts.distinct_hits,
                });
                let precision = ratio(totals.retrieved_hits, totals.retrieved);
                let recall = ratio(totals.distinct_hits, totals.relevant);
                (precision, recall, F1::combine(precision, recall))
            }
        };

        let total_correct = outcomes.iter().filter(|o| o.correct).count();
        let total_wrong = outcomes.len() - total_correct;

        EvaluationResult {
            precision,
            recall,
            f1_score,
            mrr: mean(|o| o.scores.mrr),
            ndcg: mean(|o| o.scores.ndcg),
            avg_response_time_ms: mean(|o| o.latency.as_secs_f64() * 1000.0),
            total_correct,
            total_wrong,
            total_queries: outcomes.len(),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Serde helper for Duration as fractional milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_secs_f64() * 1000.0).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}
