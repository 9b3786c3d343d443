//! # fl-postprocess
//!
//! Final step of a Forgeline search: turns the best-first candidate pipelines
//! into one fitted model within a time budget.
//!
//! Provides the layered hyperparameter store, the post-processing lifecycle,
//! the best-fit and ensemble strategies, scoring metrics and serde
//! configuration for choosing a strategy.

mod best_fit;
mod config;
mod deadline;
mod ensemble;
mod metrics;
mod processor;
mod store;

#[cfg(test)]
mod testing;

pub use best_fit::BestFitPostProcessing;
pub use config::{PostProcessingConfig, PostProcessingMethod};
pub use deadline::Deadline;
pub use ensemble::{
    select_ensemble, EnsemblePostProcessing, EnsembleSelection, VotingMember, VotingModel,
};
pub use metrics::Metric;
pub use processor::{
    PostProcessOutcome, PostProcessReport, PostProcessingStrategy, PostProcessor,
    ProcessorState, StrategyOutput,
};
pub use store::{HyperparameterEntry, HyperparameterStore, ResolvedHyperparameters};
