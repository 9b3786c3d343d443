//! Serializable post-processing configuration chosen when a search is set up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use fl_types::{FlResult, HyperparameterValue};

use crate::best_fit::BestFitPostProcessing;
use crate::ensemble::EnsemblePostProcessing;
use crate::processor::{PostProcessingStrategy, PostProcessor};

/// Which strategy turns the search's candidates into the final model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessingMethod {
    BestFit,
    Ensemble,
}

impl PostProcessingMethod {
    pub fn strategy(&self) -> Box<dyn PostProcessingStrategy> {
        match self {
            Self::BestFit => Box::new(BestFitPostProcessing::new()),
            Self::Ensemble => Box::new(EnsemblePostProcessing::new()),
        }
    }
}

/// Post-processing section of a search configuration.
///
/// ```json
/// {"method": "ensemble", "time_fraction": 0.3, "hyperparameters": {"ensemble_size": 10}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessingConfig {
    pub method: PostProcessingMethod,
    /// Falls back to the strategy's own default when absent.
    #[serde(default)]
    pub time_fraction: Option<f64>,
    /// User-chosen hyperparameter values.
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, HyperparameterValue>,
}

impl PostProcessingConfig {
    pub fn new(method: PostProcessingMethod) -> Self {
        Self {
            method,
            time_fraction: None,
            hyperparameters: BTreeMap::new(),
        }
    }

    pub fn with_time_fraction(mut self, time_fraction: f64) -> Self {
        self.time_fraction = Some(time_fraction);
        self
    }

    pub fn with_hyperparameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<HyperparameterValue>,
    ) -> Self {
        self.hyperparameters.insert(name.into(), value.into());
        self
    }

    pub fn from_json(json: &str) -> FlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> FlResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Construct the post-processor and apply the user's overrides.
    pub fn build(&self) -> FlResult<PostProcessor> {
        let strategy = self.method.strategy();
        let mut processor = match self.time_fraction {
            Some(time_fraction) => PostProcessor::new(strategy, time_fraction)?,
            None => PostProcessor::with_default_time_fraction(strategy)?,
        };
        for (name, value) in &self.hyperparameters {
            processor.set_hyperparameter(name, value.clone())?;
        }
        Ok(processor)
    }
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self::new(PostProcessingMethod::Ensemble)
    }
}
