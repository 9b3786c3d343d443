//! Refit the single best candidate on all training data.

use std::sync::Arc;
use tracing::info;

use fl_types::{
    Candidate, FeatureTable, FitOptions, FlResult, HyperparameterError, HyperparameterValue,
    Labels, PostProcessError, SearchContext,
};

use crate::deadline::Deadline;
use crate::processor::{PostProcessingStrategy, StrategyOutput};
use crate::store::{HyperparameterStore, ResolvedHyperparameters};

/// Post-processing that keeps only the top-ranked candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFitPostProcessing;

impl BestFitPostProcessing {
    pub const NAME: &'static str = "BestFitPostProcessing";
    pub const DEFAULT_TIME_FRACTION: f64 = 0.1;

    pub fn new() -> Self {
        Self
    }
}

impl PostProcessingStrategy for BestFitPostProcessing {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_time_fraction(&self) -> f64 {
        Self::DEFAULT_TIME_FRACTION
    }

    fn register_hyperparameters(
        &self,
        store: &mut HyperparameterStore,
    ) -> Result<(), HyperparameterError> {
        store.register("seed", Some(HyperparameterValue::Int(0)))
    }

    fn compute_dynamic_defaults(
        &self,
        context: &SearchContext,
    ) -> Vec<(String, HyperparameterValue)> {
        context
            .seed
            .map(|seed| vec![("seed".to_string(), HyperparameterValue::from(seed))])
            .unwrap_or_default()
    }

    fn post_process(
        &self,
        hyperparameters: &ResolvedHyperparameters,
        x: &FeatureTable,
        y: &Labels,
        _deadline: Deadline,
        selection: &[Arc<dyn Candidate>],
    ) -> FlResult<StrategyOutput> {
        let best = selection.first().ok_or(PostProcessError::EmptySelection)?;
        let options = FitOptions::with_seed(hyperparameters.get_seed("seed")?);

        info!("Refitting best candidate {}", best.describe());
        let model = best.realize().fit(x, y, &options)?;
        Ok(StrategyOutput::single(model))
    }
}
