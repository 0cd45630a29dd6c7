//! # kbeval-metrics
//!
//! Information-retrieval metrics for evaluating knowledge-base retrieval.
//!
//! Every metric is a pure function of a [`MetricInput`]: a list of
//! ground-truth relevance groups plus the rank-ordered identifiers the
//! retrieval step returned. Scores are always in `[0, 1]` and never NaN.
//!
//! ## Metrics
//!
//! - **[`Precision`]**: relevant retrieved entries over retrieved entries
//! - **[`Recall`]**: distinct relevant hits over the relevant set
//! - **[`F1`]**: harmonic mean of precision and recall
//! - **[`Mrr`]**: reciprocal rank of the first relevant entry
//! - **[`Ndcg`]**: NDCG@k with binary relevance
//!
//! ## Example
//!
//! ```
//! use kbeval_metrics::{Metric, MetricInput, Mrr, Precision};
//!
//! let input = MetricInput::single(vec![1, 2], vec![3, 1, 2]);
//! assert_eq!(Mrr.compute(&input), 0.5);
//! assert!((Precision.compute(&input) - 2.0 / 3.0).abs() < 1e-9);
//! ```
//!
//! Per-query outcomes are folded into a task-level [`EvaluationResult`] by
//! the [`Aggregator`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod input;
pub mod metric;
pub mod result;
pub mod scorers;

pub use aggregate::{AggregationPolicy, Aggregator, HitCounts, MetricScores, QueryOutcome};
pub use input::{DocId, MetricInput};
pub use metric::{BoxedMetric, Metric, MetricSet, NamedScore};
pub use result::EvaluationResult;
pub use scorers::{F1, Mrr, Ndcg, Precision, Recall};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        AggregationPolicy, Aggregator, EvaluationResult, Metric, MetricInput, MetricSet,
        QueryOutcome,
    };
}
