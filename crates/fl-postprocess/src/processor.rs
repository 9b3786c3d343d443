//! Post-processing lifecycle shared by every strategy.
//!
//! A [`PostProcessor`] pairs a [`PostProcessingStrategy`] with its time
//! fraction and hyperparameters, and enforces the lifecycle
//! `Constructed -> DefaultsApplied (optional) -> Processed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use fl_types::{
    Candidate, FeatureTable, FittedModel, FlResult, HyperparameterError, HyperparameterValue,
    Labels, PostProcessError, SearchContext,
};

use crate::deadline::Deadline;
use crate::store::{HyperparameterStore, ResolvedHyperparameters};

/// What a strategy hands back from a post-processing run.
#[derive(Debug)]
pub struct StrategyOutput {
    pub model: Box<dyn FittedModel>,
    /// Candidates successfully fitted into the final model.
    pub members_fitted: usize,
    /// Selected candidates dropped because of the deadline or a failed fit.
    pub members_skipped: usize,
    /// Whether the model came from the last-resort fallback candidate.
    pub fallback_used: bool,
}

impl StrategyOutput {
    pub fn single(model: Box<dyn FittedModel>) -> Self {
        Self {
            model,
            members_fitted: 1,
            members_skipped: 0,
            fallback_used: false,
        }
    }
}

/// Common trait for all post-processing strategies.
pub trait PostProcessingStrategy: Send + Sync {
    /// Class-style name used when rendering, e.g. "EnsemblePostProcessing".
    fn name(&self) -> &str;

    /// Share of the run's total time this strategy asks for by default.
    fn default_time_fraction(&self) -> f64 {
        0.1
    }

    /// Declare hyperparameters and their static defaults.
    fn register_hyperparameters(
        &self,
        _store: &mut HyperparameterStore,
    ) -> Result<(), HyperparameterError> {
        Ok(())
    }

    /// Defaults derived from the search run. Must not have side effects.
    fn compute_dynamic_defaults(
        &self,
        _context: &SearchContext,
    ) -> Vec<(String, HyperparameterValue)> {
        Vec::new()
    }

    /// Turn the best-first `selection` into one fitted model.
    ///
    /// `deadline` is soft: implementations should degrade rather than fail
    /// when it passes, and only return `TimeoutExceeded` if no model at all
    /// could be produced.
    fn post_process(
        &self,
        _hyperparameters: &ResolvedHyperparameters,
        _x: &FeatureTable,
        _y: &Labels,
        _deadline: Deadline,
        _selection: &[Arc<dyn Candidate>],
    ) -> FlResult<StrategyOutput> {
        Err(PostProcessError::UnimplementedStrategy {
            strategy: self.name().to_string(),
        }
        .into())
    }
}

/// Lifecycle state of a [`PostProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorState {
    Constructed,
    DefaultsApplied,
    Processed,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructed => write!(f, "Constructed"),
            Self::DefaultsApplied => write!(f, "DefaultsApplied"),
            Self::Processed => write!(f, "Processed"),
        }
    }
}

/// Summary of a finished post-processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessReport {
    pub strategy: String,
    /// Rendering of the user-configured hyperparameters.
    pub configuration: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub budget: Duration,
    pub deadline_exceeded: bool,
    pub members_fitted: usize,
    pub members_skipped: usize,
    pub fallback_used: bool,
}

/// The final model plus a report on how it was produced.
#[derive(Debug)]
pub struct PostProcessOutcome {
    pub model: Box<dyn FittedModel>,
    pub report: PostProcessReport,
}

/// A post-processing step owned by a search run.
pub struct PostProcessor {
    strategy: Box<dyn PostProcessingStrategy>,
    time_fraction: f64,
    store: HyperparameterStore,
    state: ProcessorState,
}

impl std::fmt::Debug for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessor")
            .field("strategy", &self.strategy.name())
            .field("time_fraction", &self.time_fraction)
            .field("store", &self.store)
            .field("state", &self.state)
            .finish()
    }
}

impl PostProcessor {
    /// Create a post-processor reserving `time_fraction` of the run, which
    /// must lie in (0, 1].
    pub fn new(strategy: Box<dyn PostProcessingStrategy>, time_fraction: f64) -> FlResult<Self> {
        if !(time_fraction > 0.0 && time_fraction <= 1.0) {
            return Err(PostProcessError::InvalidConfiguration {
                message: format!("time_fraction must be in (0, 1], got {time_fraction}"),
            }
            .into());
        }

        let mut store = HyperparameterStore::new();
        strategy.register_hyperparameters(&mut store)?;

        debug!(
            "Created {} with time_fraction {} and {} hyperparameters",
            strategy.name(),
            time_fraction,
            store.len()
        );

        Ok(Self {
            strategy,
            time_fraction,
            store,
            state: ProcessorState::Constructed,
        })
    }

    /// Create a post-processor using the strategy's own default time fraction.
    pub fn with_default_time_fraction(strategy: Box<dyn PostProcessingStrategy>) -> FlResult<Self> {
        let time_fraction = strategy.default_time_fraction();
        Self::new(strategy, time_fraction)
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn time_fraction(&self) -> f64 {
        self.time_fraction
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn store(&self) -> &HyperparameterStore {
        &self.store
    }

    /// Post-processing budget carved out of a run's total time.
    pub fn budget_for(&self, total: Duration) -> Duration {
        total.mul_f64(self.time_fraction)
    }

    /// Record a user-chosen hyperparameter value.
    pub fn set_hyperparameter(
        &mut self,
        name: &str,
        value: impl Into<HyperparameterValue>,
    ) -> FlResult<()> {
        self.ensure_not_processed("set_hyperparameter")?;
        self.store.set(name, value)?;
        Ok(())
    }

    /// Effective hyperparameters (user > dynamic default > static default).
    pub fn hyperparameters(&self) -> ResolvedHyperparameters {
        self.store.all_effective()
    }

    /// Canonical rendering listing only user-set hyperparameters.
    pub fn render(&self) -> String {
        self.store.render(self.strategy.name())
    }

    /// Compute defaults from the search context and merge them in.
    ///
    /// Allowed once, and only before [`PostProcessor::post_process`].
    pub fn dynamic_defaults(&mut self, context: &SearchContext) -> FlResult<()> {
        if self.state != ProcessorState::Constructed {
            return Err(self.lifecycle_error("dynamic_defaults"));
        }

        let defaults = self.strategy.compute_dynamic_defaults(context);
        if let Some((name, _)) = defaults.iter().find(|(name, _)| !self.store.contains(name)) {
            return Err(HyperparameterError::Unknown { name: name.clone() }.into());
        }
        let merged = self.store.merge_defaults(defaults)?;

        self.state = ProcessorState::DefaultsApplied;
        info!(
            "Applied {} dynamic defaults for {} (run {})",
            merged,
            self.strategy.name(),
            context.run_id
        );
        Ok(())
    }

    /// Produce the final model from the best-first `selection`.
    ///
    /// Precondition failures leave the instance usable; once the strategy
    /// runs the instance is spent, whatever the outcome.
    pub fn post_process(
        &mut self,
        x: &FeatureTable,
        y: &Labels,
        timeout: Duration,
        selection: &[Arc<dyn Candidate>],
    ) -> FlResult<PostProcessOutcome> {
        self.ensure_not_processed("post_process")?;
        if selection.is_empty() {
            return Err(PostProcessError::EmptySelection.into());
        }
        if timeout.is_zero() {
            return Err(PostProcessError::InvalidTimeout {
                seconds: timeout.as_secs_f64(),
            }
            .into());
        }
        y.check_aligned(x)?;

        self.state = ProcessorState::Processed;
        let hyperparameters = self.store.all_effective();
        let configuration = self.render();
        let started_at = Utc::now();
        let deadline = Deadline::after(timeout);

        info!(
            "Starting {} over {} candidates with a {:.3}s budget",
            configuration,
            selection.len(),
            timeout.as_secs_f64()
        );

        let output = self
            .strategy
            .post_process(&hyperparameters, x, y, deadline, selection)?;

        let elapsed = deadline.elapsed();
        let deadline_exceeded = elapsed > timeout;
        if deadline_exceeded {
            warn!(
                "{} exceeded its budget: {:.3}s used of {:.3}s",
                self.strategy.name(),
                elapsed.as_secs_f64(),
                timeout.as_secs_f64()
            );
        }
        info!(
            "Finished {} in {:.3}s: {} members fitted, {} skipped",
            self.strategy.name(),
            elapsed.as_secs_f64(),
            output.members_fitted,
            output.members_skipped
        );

        Ok(PostProcessOutcome {
            model: output.model,
            report: PostProcessReport {
                strategy: self.strategy.name().to_string(),
                configuration,
                started_at,
                elapsed,
                budget: timeout,
                deadline_exceeded,
                members_fitted: output.members_fitted,
                members_skipped: output.members_skipped,
                fallback_used: output.fallback_used,
            },
        })
    }

    fn ensure_not_processed(&self, operation: &str) -> FlResult<()> {
        if self.state == ProcessorState::Processed {
            return Err(self.lifecycle_error(operation));
        }
        Ok(())
    }

    fn lifecycle_error(&self, operation: &str) -> fl_types::FlError {
        PostProcessError::Lifecycle {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
        .into()
    }
}

impl std::fmt::Display for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}
