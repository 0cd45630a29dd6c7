//! Orchestrator configuration.

use crate::error::{EvalResult, EvaluationError};
use crate::retry::RetryPolicy;
use kbeval_metrics::AggregationPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page size used when a caller passes `limit <= 0`.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Settings for the evaluation orchestrator.
///
/// Deserializes from JSON or YAML; missing fields take their defaults.
///
/// ```yaml
/// concurrency: 8
/// ndcg_k: 10
/// retrieval_timeout: 5000
/// retry:
///   max_retries: 2
/// aggregation: pooled
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum concurrent retrieval calls per task.
    pub concurrency: usize,
    /// NDCG cutoff. `k <= 0` evaluates the whole retrieved list.
    pub ndcg_k: i64,
    /// Minimum progress increase, in percentage points, between writes.
    pub progress_step: u8,
    /// Deadline for a single retrieval call, in milliseconds.
    #[serde(with = "option_duration_ms")]
    pub retrieval_timeout: Option<Duration>,
    /// Retry behaviour for failed retrieval calls.
    pub retry: RetryPolicy,
    /// How per-query scores are combined.
    pub aggregation: AggregationPolicy,
    /// Page size for listings when none is given.
    pub default_page_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            ndcg_k: 0,
            progress_step: 5,
            retrieval_timeout: None,
            retry: RetryPolicy::none(),
            aggregation: AggregationPolicy::MacroAverage,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrchestratorConfig {
    /// Create a default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set concurrency.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Set the NDCG cutoff.
    pub fn ndcg_k(mut self, k: i64) -> Self {
        self.ndcg_k = k;
        self
    }

    /// Set the progress write step.
    pub fn progress_step(mut self, step: u8) -> Self {
        self.progress_step = step;
        self
    }

    /// Set a per-call retrieval deadline.
    pub fn retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the aggregation policy.
    pub fn aggregation(mut self, policy: AggregationPolicy) -> Self {
        self.aggregation = policy;
        self
    }

    /// Set the default page size.
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> EvalResult<()> {
        if self.concurrency == 0 {
            return Err(EvaluationError::Config("concurrency must be at least 1".into()));
        }
        if !(1..=100).contains(&self.progress_step) {
            return Err(EvaluationError::Config(format!(
                "progress_step must be within 1..=100, got {}",
                self.progress_step
            )));
        }
        if self.default_page_size == 0 {
            return Err(EvaluationError::Config("default_page_size must be at least 1".into()));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(EvaluationError::Config(
                "retry multiplier must be a finite number >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON string.
    pub fn from_json_str(content: &str) -> EvalResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| EvaluationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML string.
    pub fn from_yaml_str(content: &str) -> EvalResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| EvaluationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Pagination bounds after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum items.
    pub limit: usize,
    /// Items to skip.
    pub offset: usize,
}

impl Page {
    /// Apply defaults: `limit <= 0` becomes `default_limit`, negative
    /// offsets become zero.
    pub fn normalize(limit: i64, offset: i64, default_limit: usize) -> Self {
        let limit = if limit <= 0 {
            default_limit
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        Self { limit, offset }
    }
}

/// Serde helper for Duration as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Serde helper for Option<Duration> as integer milliseconds.
mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
