use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::data::{FeatureTable, Labels, ProbabilityTable, ValidationPredictions};
use crate::errors::FlResult;

/// Options passed to every fit so training is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitOptions {
    pub seed: u64,
}

impl FitOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

/// A trained model, the sole artifact handed back to the driver.
pub trait FittedModel: Send + Sync + Debug {
    /// Predict one label per row of `x`.
    fn predict(&self, x: &FeatureTable) -> FlResult<Labels>;

    /// Class probabilities, for classifiers that support them.
    fn predict_proba(&self, _x: &FeatureTable) -> Option<FlResult<ProbabilityTable>> {
        None
    }
}

/// An unfitted estimator realized from a candidate pipeline.
pub trait Estimator: Send {
    /// Consume the estimator and train it on `(x, y)`.
    fn fit(
        self: Box<Self>,
        x: &FeatureTable,
        y: &Labels,
        options: &FitOptions,
    ) -> FlResult<Box<dyn FittedModel>>;
}

/// A candidate pipeline descriptor produced by the search engine.
///
/// Post-processing only reads candidates; ownership stays with the search.
pub trait Candidate: Send + Sync + Debug {
    /// Stable identifier, unique within a search run.
    fn id(&self) -> &str;

    /// Human-readable pipeline description.
    fn describe(&self) -> String {
        self.id().to_string()
    }

    /// Search fitness; higher is better.
    fn fitness(&self) -> f64;

    /// Out-of-fold predictions recorded while the candidate was evaluated.
    fn validation_predictions(&self) -> Option<&ValidationPredictions> {
        None
    }

    /// Expected wall-clock cost of one fit on the full training data.
    fn estimated_fit_seconds(&self) -> Option<f64> {
        None
    }

    /// Build a fresh, unfitted estimator for this pipeline.
    fn realize(&self) -> Box<dyn Estimator>;
}
