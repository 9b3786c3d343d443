//! Ensemble post-processing: greedy selection over cached out-of-fold
//! predictions, then a deadline-aware parallel fit of the chosen members.

mod selection;
mod voting;

pub use selection::{select_ensemble, EnsembleSelection};
pub use voting::{VotingMember, VotingModel};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fl_types::{
    internal_error, Candidate, FeatureTable, FitOptions, FittedModel, FlError, FlResult,
    HyperparameterError, HyperparameterValue, Labels, PostProcessError, SearchContext,
    ValidationPredictions,
};

use crate::deadline::Deadline;
use crate::metrics::Metric;
use crate::processor::{PostProcessingStrategy, StrategyOutput};
use crate::store::{HyperparameterStore, ResolvedHyperparameters};

const DEFAULT_ENSEMBLE_SIZE: i64 = 25;
const DEFAULT_MAX_MODELS: i64 = 200;

/// Builds a weighted voting ensemble from the best candidates.
///
/// Hyperparameters:
/// - `metric`: name of the [`Metric`] to optimize; defaults to the search's
///   primary metric once dynamic defaults are applied.
/// - `ensemble_size`: number of picks (with replacement), default 25.
/// - `max_models`: how many of the top candidates are considered, default 200.
/// - `seed`: seeds tie-breaking and every member fit, default 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsemblePostProcessing;

/// Result of trying to fit one selected member.
enum MemberFit {
    Fitted(Box<dyn FittedModel>),
    Skipped,
    Failed(FlError),
}

impl EnsemblePostProcessing {
    pub const NAME: &'static str = "EnsemblePostProcessing";
    pub const DEFAULT_TIME_FRACTION: f64 = 0.3;

    pub fn new() -> Self {
        Self
    }

    fn metric(
        hyperparameters: &ResolvedHyperparameters,
        y: &Labels,
    ) -> Result<Metric, HyperparameterError> {
        let metric: Metric = hyperparameters.get_str("metric")?.parse()?;
        if metric.problem_type() != y.problem_type() {
            return Err(HyperparameterError::InvalidValue {
                name: "metric".to_string(),
                message: format!(
                    "{} scores {} problems, labels are {}",
                    metric,
                    metric.problem_type(),
                    y.problem_type()
                ),
            });
        }
        Ok(metric)
    }

    /// Cheapest candidate to fit that has not already failed; unknown costs
    /// rank last and ties keep best-first order.
    fn fallback_index(selection: &[Arc<dyn Candidate>], failed: &HashSet<usize>) -> Option<usize> {
        selection
            .iter()
            .enumerate()
            .filter(|(i, _)| !failed.contains(i))
            .min_by(|(ia, a), (ib, b)| {
                let ca = a.estimated_fit_seconds().unwrap_or(f64::INFINITY);
                let cb = b.estimated_fit_seconds().unwrap_or(f64::INFINITY);
                ca.total_cmp(&cb).then(ia.cmp(ib))
            })
            .map(|(i, _)| i)
    }
}

impl PostProcessingStrategy for EnsemblePostProcessing {
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
        store.register("metric", None)?;
        store.register("ensemble_size", Some(DEFAULT_ENSEMBLE_SIZE.into()))?;
        store.register("max_models", Some(DEFAULT_MAX_MODELS.into()))?;
        store.register("seed", Some(HyperparameterValue::Int(0)))
    }

    fn compute_dynamic_defaults(
        &self,
        context: &SearchContext,
    ) -> Vec<(String, HyperparameterValue)> {
        let mut defaults = vec![(
            "metric".to_string(),
            HyperparameterValue::Text(context.primary_metric.clone()),
        )];
        if context.evaluated_candidates > 0 {
            let size = (context.evaluated_candidates as i64).min(DEFAULT_ENSEMBLE_SIZE);
            defaults.push(("ensemble_size".to_string(), size.into()));
        }
        if let Some(seed) = context.seed {
            defaults.push(("seed".to_string(), HyperparameterValue::from(seed)));
        }
        defaults
    }

    fn post_process(
        &self,
        hyperparameters: &ResolvedHyperparameters,
        x: &FeatureTable,
        y: &Labels,
        deadline: Deadline,
        selection: &[Arc<dyn Candidate>],
    ) -> FlResult<StrategyOutput> {
        if selection.is_empty() {
            return Err(PostProcessError::EmptySelection.into());
        }
        let metric = Self::metric(hyperparameters, y)?;
        let ensemble_size = hyperparameters.get_usize("ensemble_size")?;
        if ensemble_size == 0 {
            return Err(HyperparameterError::InvalidValue {
                name: "ensemble_size".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        let max_models = hyperparameters.get_usize("max_models")?;
        if max_models == 0 {
            return Err(HyperparameterError::InvalidValue {
                name: "max_models".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        let seed = hyperparameters.get_seed("seed")?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // Candidates whose cached predictions match the labels.
        let (pool_index, pool): (Vec<usize>, Vec<&ValidationPredictions>) = selection
            .iter()
            .take(max_models)
            .enumerate()
            .filter_map(|(i, c)| {
                c.validation_predictions()
                    .filter(|p| p.problem_type() == y.problem_type() && p.len() == y.len())
                    .map(|p| (i, p))
            })
            .unzip();

        let weights: Vec<(usize, u32)> = if pool.is_empty() {
            warn!("No candidate carries usable validation predictions, ensembling the best only");
            vec![(0, 1)]
        } else {
            let chosen = select_ensemble(&pool, y, metric, ensemble_size, &deadline, &mut rng)?;
            info!(
                "Selected {} distinct members over {} picks ({} {:.6}{})",
                chosen.weights.len(),
                chosen.picks,
                metric,
                chosen.score,
                if chosen.truncated { ", truncated by deadline" } else { "" }
            );
            chosen
                .weights
                .into_iter()
                .map(|(p, w)| (pool_index[p], w))
                .collect()
        };

        let options = FitOptions::with_seed(seed);
        let fits: Vec<MemberFit> = weights
            .par_iter()
            .map(|&(i, _)| {
                let candidate = &selection[i];
                if deadline.is_expired() {
                    debug!("Deadline reached, skipping {}", candidate.id());
                    return MemberFit::Skipped;
                }
                match candidate.realize().fit(x, y, &options) {
                    Ok(model) => {
                        debug!("Fitted ensemble member {}", candidate.id());
                        MemberFit::Fitted(model)
                    }
                    Err(e) => MemberFit::Failed(e),
                }
            })
            .collect();

        let mut members = Vec::new();
        let mut failed = HashSet::new();
        let mut last_error = None;
        for (&(i, weight), fit) in weights.iter().zip(fits) {
            match fit {
                MemberFit::Fitted(model) => members.push(VotingMember {
                    id: selection[i].id().to_string(),
                    weight,
                    model,
                }),
                MemberFit::Skipped => {}
                MemberFit::Failed(e) => {
                    warn!("Fitting ensemble member {} failed: {}", selection[i].id(), e);
                    failed.insert(i);
                    last_error = Some(e);
                }
            }
        }
        let members_skipped = weights.len() - members.len();

        let classes = y.classes();
        if !members.is_empty() {
            let members_fitted = members.len();
            let model = VotingModel::new(y.problem_type(), classes, members)?;
            return Ok(StrategyOutput {
                model: Box::new(model),
                members_fitted,
                members_skipped,
                fallback_used: false,
            });
        }

        // Nothing fitted in time: a late model beats no model.
        while let Some(i) = Self::fallback_index(selection, &failed) {
            let candidate = &selection[i];
            warn!("No ensemble member fitted, falling back to {}", candidate.id());
            match candidate.realize().fit(x, y, &options) {
                Ok(model) => {
                    let member = VotingMember {
                        id: candidate.id().to_string(),
                        weight: 1,
                        model,
                    };
                    let model =
                        VotingModel::new(y.problem_type(), classes.clone(), vec![member])?;
                    return Ok(StrategyOutput {
                        model: Box::new(model),
                        members_fitted: 1,
                        members_skipped,
                        fallback_used: true,
                    });
                }
                Err(e) => {
                    warn!("Fallback candidate {} failed: {}", candidate.id(), e);
                    failed.insert(i);
                    last_error = Some(e);
                    if deadline.is_expired() {
                        break;
                    }
                }
            }
        }

        if deadline.is_expired() {
            return Err(PostProcessError::TimeoutExceeded {
                timeout_seconds: deadline.budget().as_secs_f64(),
            }
            .into());
        }
        Err(last_error
            .unwrap_or_else(|| internal_error!("ensemble produced no model and recorded no error")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::PostProcessor;
    use crate::testing::{classification_data, regression_data, ScriptedCandidate};
    use fl_types::{ProbabilityTable, ProblemType};
    use std::time::Duration;

    fn regression_context() -> SearchContext {
        SearchContext::new(ProblemType::Regression, "neg_mean_squared_error")
            .with_evaluated_candidates(10)
            .with_seed(3)
    }

    fn as_dyn(candidates: &[Arc<ScriptedCandidate>]) -> Vec<Arc<dyn Candidate>> {
        candidates
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn Candidate>)
            .collect()
    }

    fn regression_pool() -> Vec<Arc<ScriptedCandidate>> {
        vec![
            Arc::new(
                ScriptedCandidate::constant("low", 1.5, 0.9)
                    .with_validation(ValidationPredictions::Regression(vec![0.0, 1.0, 2.0, 3.0])),
            ),
            Arc::new(
                ScriptedCandidate::constant("high", 3.5, 0.8)
                    .with_validation(ValidationPredictions::Regression(vec![2.0, 3.0, 4.0, 5.0])),
            ),
            Arc::new(
                ScriptedCandidate::constant("far", 100.0, 0.1)
                    .with_validation(ValidationPredictions::Regression(vec![50.0; 4])),
            ),
        ]
    }

    #[test]
    fn dynamic_defaults_follow_context() {
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        assert!(matches!(
            processor.hyperparameters().get("metric"),
            Err(HyperparameterError::Unresolved { .. })
        ));

        processor.dynamic_defaults(&regression_context()).unwrap();
        let hp = processor.hyperparameters();
        assert_eq!(hp.get_str("metric").unwrap(), "neg_mean_squared_error");
        assert_eq!(hp.get_usize("ensemble_size").unwrap(), 10);
        assert_eq!(hp.get_usize("max_models").unwrap(), 200);
        assert_eq!(hp.get_seed("seed").unwrap(), 3);
        assert_eq!(processor.render(), "EnsemblePostProcessing()");
    }

    #[test]
    fn builds_weighted_regression_ensemble() {
        let scripted = regression_pool();
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("ensemble_size", 2).unwrap();
        processor.dynamic_defaults(&regression_context()).unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap();

        // low (1.5) and high (3.5) averaged with equal weight.
        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Continuous(vec![2.5; 4])
        );
        assert_eq!(outcome.report.members_fitted, 2);
        assert_eq!(outcome.report.members_skipped, 0);
        assert_eq!(scripted[2].fit_count(), 0);
        assert_eq!(outcome.report.configuration, "EnsemblePostProcessing(ensemble_size=2)");
    }

    #[test]
    fn max_models_limits_the_pool() {
        let scripted = regression_pool();
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("max_models", 1).unwrap();
        processor.dynamic_defaults(&regression_context()).unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap();

        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Continuous(vec![1.5; 4])
        );
        assert_eq!(scripted[1].fit_count(), 0);
    }

    #[test]
    fn missing_metric_is_unresolved() {
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        let (x, y) = regression_data();
        let err = processor
            .post_process(&x, &y, Duration::from_secs(5), &as_dyn(&regression_pool()))
            .unwrap_err();
        assert!(matches!(
            err,
            FlError::Hyperparameter(HyperparameterError::Unresolved { .. })
        ));
    }

    #[test]
    fn metric_must_match_problem_type() {
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "accuracy").unwrap();
        let (x, y) = regression_data();
        let err = processor
            .post_process(&x, &y, Duration::from_secs(5), &as_dyn(&regression_pool()))
            .unwrap_err();
        assert!(matches!(
            err,
            FlError::Hyperparameter(HyperparameterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn zero_max_models_is_rejected() {
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "r2").unwrap();
        processor.set_hyperparameter("max_models", 0).unwrap();
        let (x, y) = regression_data();
        let err = processor
            .post_process(&x, &y, Duration::from_secs(5), &as_dyn(&regression_pool()))
            .unwrap_err();
        match err {
            FlError::Hyperparameter(HyperparameterError::InvalidValue { name, .. }) => {
                assert_eq!(name, "max_models")
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn without_validation_predictions_the_best_candidate_is_used() {
        let scripted = vec![
            Arc::new(ScriptedCandidate::constant("best", 7.0, 0.9)),
            Arc::new(ScriptedCandidate::constant("second", 8.0, 0.8)),
        ];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "r2").unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(5), &as_dyn(&scripted))
            .unwrap();
        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Continuous(vec![7.0; 4])
        );
        assert_eq!(scripted[1].fit_count(), 0);
    }

    #[test]
    fn failed_member_is_dropped() {
        let scripted = vec![
            Arc::new(
                ScriptedCandidate::constant("low", 1.5, 0.9)
                    .with_validation(ValidationPredictions::Regression(vec![0.0, 1.0, 2.0, 3.0]))
                    .failing(),
            ),
            Arc::new(
                ScriptedCandidate::constant("high", 3.5, 0.8)
                    .with_validation(ValidationPredictions::Regression(vec![2.0, 3.0, 4.0, 5.0])),
            ),
        ];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "neg_mean_squared_error").unwrap();
        processor.set_hyperparameter("ensemble_size", 2).unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap();
        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Continuous(vec![3.5; 4])
        );
        assert_eq!(outcome.report.members_fitted, 1);
        assert_eq!(outcome.report.members_skipped, 1);
    }

    #[test]
    fn all_members_failing_falls_back_to_cheapest() {
        let scripted = vec![
            Arc::new(
                ScriptedCandidate::constant("expensive", 1.0, 0.9)
                    .with_validation(ValidationPredictions::Regression(vec![1.0, 2.0, 3.0, 4.0]))
                    .failing(),
            ),
            Arc::new(ScriptedCandidate::constant("slow", 2.0, 0.5).with_estimated_cost(60.0)),
            Arc::new(ScriptedCandidate::constant("cheap", 3.0, 0.4).with_estimated_cost(0.5)),
        ];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "r2").unwrap();
        processor.set_hyperparameter("ensemble_size", 1).unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap();
        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Continuous(vec![3.0; 4])
        );
        assert!(outcome.report.fallback_used);
        assert_eq!(scripted[1].fit_count(), 0);
    }

    #[test]
    fn deadline_during_fits_degrades_instead_of_failing() {
        let scripted = vec![
            Arc::new(
                ScriptedCandidate::constant("a", 1.0, 0.9)
                    .with_validation(ValidationPredictions::Regression(vec![0.0, 1.0, 2.0, 3.0]))
                    .with_fit_delay(Duration::from_millis(50)),
            ),
            Arc::new(
                ScriptedCandidate::constant("b", 2.0, 0.8)
                    .with_validation(ValidationPredictions::Regression(vec![2.0, 3.0, 4.0, 5.0]))
                    .with_fit_delay(Duration::from_millis(50)),
            ),
        ];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "neg_mean_squared_error").unwrap();

        let (x, y) = regression_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_millis(1), &as_dyn(&scripted))
            .unwrap();

        // Whatever was (or was not) started in time, a model always comes back.
        assert!(outcome.model.predict(&x).is_ok());
        assert!(outcome.report.deadline_exceeded);
    }

    #[test]
    fn timeout_exceeded_when_nothing_can_be_fitted() {
        let scripted = vec![Arc::new(
            ScriptedCandidate::constant("broken", 1.0, 0.9)
                .with_fit_delay(Duration::from_millis(20))
                .failing(),
        )];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "r2").unwrap();

        let (x, y) = regression_data();
        let err = processor
            .post_process(&x, &y, Duration::from_millis(1), &as_dyn(&scripted))
            .unwrap_err();
        assert!(matches!(
            err,
            FlError::PostProcess(PostProcessError::TimeoutExceeded { .. })
        ));
    }

    #[test]
    fn failure_within_budget_surfaces_the_fit_error() {
        let scripted = vec![Arc::new(ScriptedCandidate::constant("broken", 1.0, 0.9).failing())];
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.set_hyperparameter("metric", "r2").unwrap();

        let (x, y) = regression_data();
        let err = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap_err();
        assert!(matches!(
            err,
            FlError::PostProcess(PostProcessError::FitFailed { .. })
        ));
    }

    #[test]
    fn classification_ensemble_predicts_probabilities() {
        let classes = ["a", "b"];
        let truth: Vec<String> = vec!["a".into(), "a".into(), "b".into(), "b".into()];
        let ab: Vec<String> = vec!["a".into(), "b".into()];
        let scripted = vec![
            Arc::new(
                ScriptedCandidate::class("always_a", &classes, "a", 0.5).with_validation(
                    ValidationPredictions::Classification(ProbabilityTable::one_hot(
                        &ab,
                        &vec!["a".to_string(); 4],
                    )),
                ),
            ),
            Arc::new(
                ScriptedCandidate::class("perfect", &classes, "b", 1.0).with_validation(
                    ValidationPredictions::Classification(ProbabilityTable::one_hot(&ab, &truth)),
                ),
            ),
        ];
        let context = SearchContext::new(ProblemType::Classification, "accuracy")
            .with_evaluated_candidates(2);
        let mut processor = PostProcessor::new(Box::new(EnsemblePostProcessing), 0.3).unwrap();
        processor.dynamic_defaults(&context).unwrap();

        let (x, y) = classification_data();
        let outcome = processor
            .post_process(&x, &y, Duration::from_secs(30), &as_dyn(&scripted))
            .unwrap();

        // Only the perfect validator is picked, so its fitted output wins.
        assert_eq!(
            outcome.model.predict(&x).unwrap(),
            Labels::Categorical(vec!["b".to_string(); 4])
        );
        let proba = outcome.model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.classes, ab);
        assert_eq!(scripted[0].fit_count(), 0);
    }
}
