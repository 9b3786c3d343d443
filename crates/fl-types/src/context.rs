use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::data::ProblemType;

/// Read-only snapshot of the owning search run, handed to dynamic defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchContext {
    pub run_id: Uuid,
    pub problem_type: ProblemType,
    /// Wall-clock allowance of the whole search run.
    pub total_time: Duration,
    /// Time already spent by the search.
    pub elapsed: Duration,
    /// Name of the metric the search optimized, e.g. "accuracy".
    pub primary_metric: String,
    /// Number of candidate pipelines evaluated so far.
    pub evaluated_candidates: usize,
    pub n_samples: usize,
    pub n_features: usize,
    pub seed: Option<u64>,
}

impl SearchContext {
    pub fn new(problem_type: ProblemType, primary_metric: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            problem_type,
            total_time: Duration::from_secs(3600),
            elapsed: Duration::ZERO,
            primary_metric: primary_metric.into(),
            evaluated_candidates: 0,
            n_samples: 0,
            n_features: 0,
            seed: None,
        }
    }

    pub fn with_time(mut self, total_time: Duration, elapsed: Duration) -> Self {
        self.total_time = total_time;
        self.elapsed = elapsed;
        self
    }

    pub fn with_evaluated_candidates(mut self, n: usize) -> Self {
        self.evaluated_candidates = n;
        self
    }

    pub fn with_shape(mut self, n_samples: usize, n_features: usize) -> Self {
        self.n_samples = n_samples;
        self.n_features = n_features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Time left in the run's budget (zero once exhausted).
    pub fn remaining(&self) -> Duration {
        self.total_time.saturating_sub(self.elapsed)
    }
}
