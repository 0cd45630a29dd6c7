//! Evaluation errors.

use crate::store::StoreError;
use crate::task::StateError;
use std::fmt;
use thiserror::Error;

/// Kind of resource a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A QA dataset.
    Dataset,
    /// A knowledge base.
    KnowledgeBase,
    /// An evaluation task.
    Task,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Dataset => write!(f, "Dataset"),
            ResourceKind::KnowledgeBase => write!(f, "Knowledge base"),
            ResourceKind::Task => write!(f, "Evaluation task"),
        }
    }
}

/// Errors that can occur while managing or running an evaluation.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// A referenced resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: ResourceKind,
        /// The missing identifier.
        id: String,
    },

    /// Request failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Illegal lifecycle transition.
    #[error(transparent)]
    State(#[from] StateError),

    /// Task store failure.
    #[error("Task store error: {0}")]
    Store(StoreError),

    /// Retrieval collaborator failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// The run was cancelled.
    #[error("Evaluation was cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EvaluationError {
    /// Create a not-found error.
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a lifecycle error.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<StoreError> for EvaluationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found(ResourceKind::Task, id),
            StoreError::Transition(state) => Self::State(state),
            other => Self::Store(other),
        }
    }
}

/// Result type for evaluation operations.
pub type EvalResult<T> = Result<T, EvaluationError>;
