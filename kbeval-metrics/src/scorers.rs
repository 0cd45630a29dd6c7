//! The built-in retrieval metrics.
//!
//! All metrics use binary relevance against the union of the ground-truth
//! groups. Precision counts duplicate retrieved identifiers individually,
//! while recall and MRR work on distinct hits. Callers depend on this
//! asymmetry, so it is kept as is.

use crate::input::MetricInput;
use crate::metric::Metric;
use std::hash::Hash;

/// Fraction of retrieved entries that are relevant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Precision;

impl<Id: Eq + Hash> Metric<Id> for Precision {
    fn name(&self) -> &str {
        "precision"
    }

    fn compute(&self, input: &MetricInput<Id>) -> f64 {
        if input.retrieved.is_empty() {
            return 0.0;
        }
        let relevant = input.relevant_set();
        input.retrieved_hits(&relevant) as f64 / input.retrieved.len() as f64
    }
}

/// Fraction of relevant documents that were retrieved at least once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recall;

impl<Id: Eq + Hash> Metric<Id> for Recall {
    fn name(&self) -> &str {
        "recall"
    }

    fn compute(&self, input: &MetricInput<Id>) -> f64 {
        let relevant = input.relevant_set();
        if relevant.is_empty() {
            return 0.0;
        }
        input.distinct_hits(&relevant) as f64 / relevant.len() as f64
    }
}

/// Harmonic mean of [`Precision`] and [`Recall`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct F1;

impl F1 {
    /// Combine precision and recall.
    pub fn combine(precision: f64, recall: f64) -> f64 {
        let sum = precision + recall;
        if sum == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / sum
        }
    }
}

impl<Id: Eq + Hash> Metric<Id> for F1 {
    fn name(&self) -> &str {
        "f1"
    }

    fn compute(&self, input: &MetricInput<Id>) -> f64 {
        F1::combine(Precision.compute(input), Recall.compute(input))
    }
}

/// Reciprocal rank of the first relevant entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mrr;

impl<Id: Eq + Hash> Metric<Id> for Mrr {
    fn name(&self) -> &str {
        "mrr"
    }

    fn compute(&self, input: &MetricInput<Id>) -> f64 {
        let relevant = input.relevant_set();
        match input.first_hit_rank(&relevant) {
            Some(rank) => 1.0 / (rank + 1) as f64,
            None => 0.0,
        }
    }
}

/// Normalized discounted cumulative gain with a rank cutoff.
///
/// A cutoff `k <= 0` evaluates the full retrieved list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ndcg {
    /// Rank cutoff.
    pub k: i64,
}

impl Ndcg {
    /// Create an NDCG metric with cutoff `k`.
    pub fn new(k: i64) -> Self {
        Self { k }
    }

    /// Evaluate the full retrieved list.
    pub fn full() -> Self {
        Self { k: 0 }
    }

    fn cutoff(&self, retrieved_len: usize) -> usize {
        if self.k <= 0 {
            retrieved_len
        } else {
            usize::try_from(self.k).unwrap_or(usize::MAX)
        }
    }
}

fn discount(rank: usize) -> f64 {
    1.0 / ((rank + 2) as f64).log2()
}

impl<Id: Eq + Hash> Metric<Id> for Ndcg {
    fn name(&self) -> &str {
        "ndcg"
    }

    fn compute(&self, input: &MetricInput<Id>) -> f64 {
        let relevant = input.relevant_set();
        let k = self.cutoff(input.retrieved.len());

        let idcg: f64 = (0..k.min(relevant.len())).map(discount).sum();
        if idcg == 0.0 {
            return 0.0;
        }

        let dcg: f64 = input
            .retrieved
            .iter()
            .take(k)
            .enumerate()
            .filter(|(_, id)| relevant.contains(id))
            .map(|(rank, _)| discount(rank))
            .sum();

        // Duplicated relevant ids can push DCG past the ideal ordering.
        (dcg / idcg).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPS: f64 = 1e-9;

    fn all_scores(input: &MetricInput<u32>, k: i64) -> [f64; 5] {
        [
            Precision.compute(input),
            Recall.compute(input),
            F1.compute(input),
            Mrr.compute(input),
            Ndcg::new(k).compute(input),
        ]
    }

    #[rstest]
    #[case(vec![vec![1, 3, 5]], vec![1, 3, 5], 1.0)]
    #[case(vec![vec![1, 2, 3]], vec![1, 4, 2], 2.0 / 3.0)]
    #[case(vec![vec![1, 2, 3]], vec![4, 5, 6], 0.0)]
    #[case(vec![vec![1]], vec![1, 1, 2, 3], 0.5)]
    fn test_precision(#[case] gt: Vec<Vec<u32>>, #[case] retrieved: Vec<u32>, #[case] expected: f64) {
        let input = MetricInput::new(gt, retrieved);
        assert!((Precision.compute(&input) - expected).abs() < EPS);
    }

    #[rstest]
    // The union of the groups is {1, 2, 3, 4}, so hits {1, 4} give 2/4, not 2/5.
    #[case(vec![vec![1, 2], vec![3, 4]], vec![1, 4, 6], 0.5)]
    #[case(vec![vec![1, 2], vec![2, 3]], vec![2, 2, 2], 1.0 / 3.0)]
    #[case(vec![vec![1, 2, 3]], vec![3, 2, 1], 1.0)]
    #[case(vec![vec![1, 2, 3]], vec![4, 5, 6], 0.0)]
    fn test_recall(#[case] gt: Vec<Vec<u32>>, #[case] retrieved: Vec<u32>, #[case] expected: f64) {
        let input = MetricInput::new(gt, retrieved);
        assert!((Recall.compute(&input) - expected).abs() < EPS);
    }

    #[rstest]
    #[case(vec![vec![1, 2]], vec![3, 1, 2], 0.5)]
    #[case(vec![vec![1, 2]], vec![1, 2], 1.0)]
    #[case(vec![vec![9]], vec![1, 2, 3, 9], 0.25)]
    #[case(vec![vec![1, 2, 3]], vec![4, 5, 6], 0.0)]
    fn test_mrr(#[case] gt: Vec<Vec<u32>>, #[case] retrieved: Vec<u32>, #[case] expected: f64) {
        let input = MetricInput::new(gt, retrieved);
        assert!((Mrr.compute(&input) - expected).abs() < EPS);
    }

    #[test]
    fn test_ndcg_perfect_ranking() {
        let input = MetricInput::single(vec![1, 2, 3], vec![1, 2, 3, 4, 5]);
        assert!((Ndcg::new(5).compute(&input) - 1.0).abs() < EPS);
        assert!((Ndcg::full().compute(&input) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_ndcg_single_hit_at_second_rank() {
        let input = MetricInput::single(vec![7], vec![1, 7]);
        let expected = (1.0 / 3f64.log2()) / 1.0;
        assert!((Ndcg::new(2).compute(&input) - expected).abs() < EPS);
    }

    #[test]
    fn test_ndcg_cutoff_excludes_late_hits() {
        let input = MetricInput::single(vec![3], vec![1, 2, 3]);
        assert_eq!(Ndcg::new(2).compute(&input), 0.0);
        assert!(Ndcg::new(3).compute(&input) > 0.0);
    }

    #[test]
    fn test_ndcg_ideal_uses_relevant_count_up_to_k() {
        // Two relevant, only one retrieved at rank 0: DCG = 1, IDCG = 1 + 1/log2(3).
        let input = MetricInput::single(vec![1, 2], vec![1, 9, 8]);
        let expected = 1.0 / (1.0 + 1.0 / 3f64.log2());
        assert!((Ndcg::new(3).compute(&input) - expected).abs() < EPS);
    }

    #[test]
    fn test_ndcg_non_positive_k_with_empty_retrieval() {
        let input = MetricInput::single(vec![1, 2], vec![]);
        assert_eq!(Ndcg::new(0).compute(&input), 0.0);
        assert_eq!(Ndcg::new(-3).compute(&input), 0.0);
    }

    #[test]
    fn test_ndcg_duplicate_hits_are_capped() {
        let input = MetricInput::single(vec![1], vec![1, 1, 1]);
        assert_eq!(Ndcg::new(3).compute(&input), 1.0);
    }

    #[test]
    fn test_all_zero_when_nothing_relevant_retrieved() {
        let input = MetricInput::single(vec![1, 2, 3], vec![4, 5, 6]);
        assert_eq!(all_scores(&input, 0), [0.0; 5]);
    }

    #[test]
    fn test_empty_inputs() {
        let no_retrieval = MetricInput::single(vec![1, 2], vec![]);
        assert_eq!(Precision.compute(&no_retrieval), 0.0);
        assert_eq!(F1.compute(&no_retrieval), 0.0);

        let no_truth: MetricInput<u32> = MetricInput::new(vec![], vec![1, 2]);
        assert_eq!(Recall.compute(&no_truth), 0.0);
        assert_eq!(Mrr.compute(&no_truth), 0.0);
        assert_eq!(Ndcg::new(5).compute(&no_truth), 0.0);

        let empty_groups: MetricInput<u32> = MetricInput::new(vec![vec![], vec![]], vec![1]);
        assert_eq!(Recall.compute(&empty_groups), 0.0);
    }

    #[test]
    fn test_f1_consistency() {
        let inputs = vec![
            MetricInput::single(vec![1, 2, 3], vec![1, 4, 2]),
            MetricInput::new(vec![vec![1, 2], vec![3, 4]], vec![1, 4, 6]),
            MetricInput::single(vec![1], vec![1, 1, 1, 2]),
            MetricInput::single(vec![1], vec![5]),
        ];
        for input in &inputs {
            let p = Precision.compute(input);
            let r = Recall.compute(input);
            let expected = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
            assert!((F1.compute(input) - expected).abs() < EPS);
        }
    }

    #[test]
    fn test_scores_bounded_and_idempotent() {
        let inputs = vec![
            MetricInput::single(vec![1, 2], vec![1, 1, 1, 1]),
            MetricInput::new(vec![vec![1], vec![1], vec![2]], vec![2, 1, 2, 1]),
            MetricInput::new(vec![], vec![]),
            MetricInput::single(vec![5, 6, 7, 8], vec![8]),
        ];
        for input in &inputs {
            for k in [-1, 0, 1, 3, 100] {
                let first = all_scores(input, k);
                let second = all_scores(input, k);
                assert_eq!(first, second);
                for score in first {
                    assert!(!score.is_nan());
                    assert!((0.0..=1.0).contains(&score), "score {score} out of range");
                }
            }
        }
    }

    #[test]
    fn test_string_identifiers() {
        let input = MetricInput::single(
            vec!["doc-a".to_string(), "doc-b".to_string()],
            vec!["doc-c".to_string(), "doc-b".to_string()],
        );
        assert_eq!(Precision.compute(&input), 0.5);
        assert_eq!(Mrr.compute(&input), 0.5);
    }
}
