//! Per-query scoring input.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Identifier type used when documents are addressed by string keys.
pub type DocId = String;

/// The scoring input for a single query.
///
/// `ground_truth` holds one relevance group per annotation source. The
/// effective relevant set is the union of every group. `retrieved` is
/// rank-ordered, position 0 being the highest ranked document, and may
/// contain duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInput<Id = DocId> {
    /// Relevance groups annotated for the query.
    pub ground_truth: Vec<Vec<Id>>,
    /// Retrieved identifiers in rank order.
    #[serde(rename = "retrievedIDs")]
    pub retrieved: Vec<Id>,
}

impl<Id> MetricInput<Id> {
    /// Create an input from relevance groups and a ranked retrieval.
    pub fn new(ground_truth: Vec<Vec<Id>>, retrieved: Vec<Id>) -> Self {
        Self {
            ground_truth,
            retrieved,
        }
    }

    /// Create an input with a single relevance group.
    pub fn single(relevant: Vec<Id>, retrieved: Vec<Id>) -> Self {
        Self::new(vec![relevant], retrieved)
    }
}

impl<Id: Eq + Hash> MetricInput<Id> {
    /// Union of all relevance groups.
    pub fn relevant_set(&self) -> HashSet<&Id> {
        self.ground_truth.iter().flatten().collect()
    }

    /// Distinct retrieved identifiers.
    pub fn retrieved_set(&self) -> HashSet<&Id> {
        self.retrieved.iter().collect()
    }

    /// Number of retrieved entries that are relevant, duplicates counted.
    pub fn retrieved_hits(&self, relevant: &HashSet<&Id>) -> usize {
        self.retrieved.iter().filter(|id| relevant.contains(id)).count()
    }

    /// Number of distinct relevant identifiers present in the retrieval.
    pub fn distinct_hits(&self, relevant: &HashSet<&Id>) -> usize {
        self.retrieved_set()
            .into_iter()
            .filter(|id| relevant.contains(id))
            .count()
    }

    /// 0-based rank of the first relevant entry.
    pub fn first_hit_rank(&self, relevant: &HashSet<&Id>) -> Option<usize> {
        self.retrieved.iter().position(|id| relevant.contains(id))
    }
}
