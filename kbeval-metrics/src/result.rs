//! Task-level evaluation result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate outcome of an evaluation run.
///
/// Serialized in camelCase; `precision`, `recall`, `f1Score`,
/// `avgResponseTimeMs`, `totalCorrect` and `totalWrong` form the result
/// payload exposed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Precision in `[0, 1]`.
    pub precision: f64,
    /// Recall in `[0, 1]`.
    pub recall: f64,
    /// F1 in `[0, 1]`.
    pub f1_score: f64,
    /// Mean reciprocal rank in `[0, 1]`.
    #[serde(default)]
    pub mrr: f64,
    /// Mean NDCG in `[0, 1]`.
    #[serde(default)]
    pub ndcg: f64,
    /// Mean retrieval latency in milliseconds.
    pub avg_response_time_ms: f64,
    /// Queries judged correct.
    pub total_correct: usize,
    /// Queries judged wrong.
    pub total_wrong: usize,
    /// Number of evaluated queries.
    #[serde(default)]
    pub total_queries: usize,
}

impl EvaluationResult {
    /// Fraction of queries judged correct.
    pub fn accuracy(&self) -> f64 {
        let total = self.total_correct + self.total_wrong;
        if total == 0 {
            0.0
        } else {
            self.total_correct as f64 / total as f64
        }
    }

    /// Check that the correctness counts cover every evaluated query.
    pub fn is_consistent(&self) -> bool {
        self.total_correct + self.total_wrong == self.total_queries
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queries:      {}", self.total_queries)?;
        writeln!(f, "Precision:    {:.4}", self.precision)?;
        writeln!(f, "Recall:       {:.4}", self.recall)?;
        writeln!(f, "F1:           {:.4}", self.f1_score)?;
        writeln!(f, "MRR:          {:.4}", self.mrr)?;
        writeln!(f, "NDCG:         {:.4}", self.ndcg)?;
        writeln!(f, "Avg latency:  {:.1} ms", self.avg_response_time_ms)?;
        write!(
            f,
            "Correct:      {} / {} ({:.1}%)",
            self.total_correct,
            self.total_correct + self.total_wrong,
            self.accuracy() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names() {
        let result = EvaluationResult {
            precision: 0.5,
            recall: 0.25,
            f1_score: 1.0 / 3.0,
            avg_response_time_ms: 12.0,
            total_correct: 3,
            total_wrong: 1,
            total_queries: 4,
            ..Default::default()
        };

        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "precision",
            "recall",
            "f1Score",
            "avgResponseTimeMs",
            "totalCorrect",
            "totalWrong",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let json = r#"{"precision":1.0,"recall":1.0,"f1Score":1.0,"avgResponseTimeMs":3.5,"totalCorrect":2,"totalWrong":0}"#;
        let result: EvaluationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.total_correct, 2);
        assert_eq!(result.mrr, 0.0);
    }

    #[test]
    fn test_accuracy() {
        let result = EvaluationResult {
            total_correct: 3,
            total_wrong: 1,
            total_queries: 4,
            ..Default::default()
        };
        assert!((result.accuracy() - 0.75).abs() < 1e-9);
        assert!(result.is_consistent());
        assert_eq!(EvaluationResult::default().accuracy(), 0.0);
    }

    #[test]
    fn test_display() {
        let text = EvaluationResult::default().to_string();
        assert!(text.contains("Precision"));
        assert!(text.contains("NDCG"));
    }
}
