//! Scripted candidates for exercising strategies without a real learner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fl_types::{
    Candidate, Estimator, FeatureTable, FitOptions, FittedModel, FlResult, Labels,
    PostProcessError, ProbabilityTable, ValidationPredictions,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutput {
    Value(f64),
    Class { classes: Vec<String>, class: String },
}

/// A candidate whose fitted model always predicts the same output.
#[derive(Debug)]
pub struct ScriptedCandidate {
    id: String,
    fitness: f64,
    output: ScriptedOutput,
    validation: Option<ValidationPredictions>,
    estimated_fit_seconds: Option<f64>,
    fit_delay: Duration,
    fails: bool,
    fits: Arc<AtomicUsize>,
}

impl ScriptedCandidate {
    pub fn constant(id: &str, value: f64, fitness: f64) -> Self {
        Self::with_output(id, ScriptedOutput::Value(value), fitness)
    }

    pub fn class(id: &str, classes: &[&str], class: &str, fitness: f64) -> Self {
        Self::with_output(
            id,
            ScriptedOutput::Class {
                classes: classes.iter().map(|c| c.to_string()).collect(),
                class: class.to_string(),
            },
            fitness,
        )
    }

    fn with_output(id: &str, output: ScriptedOutput, fitness: f64) -> Self {
        Self {
            id: id.to_string(),
            fitness,
            output,
            validation: None,
            estimated_fit_seconds: None,
            fit_delay: Duration::ZERO,
            fails: false,
            fits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_validation(mut self, predictions: ValidationPredictions) -> Self {
        self.validation = Some(predictions);
        self
    }

    pub fn with_fit_delay(mut self, delay: Duration) -> Self {
        self.fit_delay = delay;
        self
    }

    pub fn with_estimated_cost(mut self, seconds: f64) -> Self {
        self.estimated_fit_seconds = Some(seconds);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}

impl Candidate for ScriptedCandidate {
    fn id(&self) -> &str {
        &self.id
    }

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn validation_predictions(&self) -> Option<&ValidationPredictions> {
        self.validation.as_ref()
    }

    fn estimated_fit_seconds(&self) -> Option<f64> {
        self.estimated_fit_seconds
    }

    fn realize(&self) -> Box<dyn Estimator> {
        Box::new(ScriptedEstimator {
            id: self.id.clone(),
            output: self.output.clone(),
            fit_delay: self.fit_delay,
            fails: self.fails,
            fits: Arc::clone(&self.fits),
        })
    }
}

struct ScriptedEstimator {
    id: String,
    output: ScriptedOutput,
    fit_delay: Duration,
    fails: bool,
    fits: Arc<AtomicUsize>,
}

impl Estimator for ScriptedEstimator {
    fn fit(
        self: Box<Self>,
        _x: &FeatureTable,
        _y: &Labels,
        options: &FitOptions,
    ) -> FlResult<Box<dyn FittedModel>> {
        std::thread::sleep(self.fit_delay);
        self.fits.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(PostProcessError::FitFailed {
                candidate: self.id,
                message: "scripted failure".to_string(),
            }
            .into());
        }
        Ok(Box::new(ScriptedModel {
            source: self.id,
            output: self.output,
            seed: options.seed,
        }))
    }
}

#[derive(Debug)]
pub struct ScriptedModel {
    pub source: String,
    pub output: ScriptedOutput,
    pub seed: u64,
}

impl FittedModel for ScriptedModel {
    fn predict(&self, x: &FeatureTable) -> FlResult<Labels> {
        Ok(match &self.output {
            ScriptedOutput::Value(v) => Labels::Continuous(vec![*v; x.n_rows()]),
            ScriptedOutput::Class { class, .. } => {
                Labels::Categorical(vec![class.clone(); x.n_rows()])
            }
        })
    }

    fn predict_proba(&self, x: &FeatureTable) -> Option<FlResult<ProbabilityTable>> {
        match &self.output {
            ScriptedOutput::Value(_) => None,
            ScriptedOutput::Class { classes, class } => Some(Ok(ProbabilityTable::one_hot(
                classes,
                &vec![class.clone(); x.n_rows()],
            ))),
        }
    }
}

/// Four rows, one feature, targets 1..=4.
pub fn regression_data() -> (FeatureTable, Labels) {
    let x = FeatureTable::new(vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]])
        .expect("rectangular");
    (x, Labels::Continuous(vec![1.0, 2.0, 3.0, 4.0]))
}

/// Four rows, one feature, classes "a"/"b".
pub fn classification_data() -> (FeatureTable, Labels) {
    let x = FeatureTable::new(vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]])
        .expect("rectangular");
    let y = Labels::Categorical(vec!["a".into(), "a".into(), "b".into(), "b".into()]);
    (x, y)
}

/// `n` best-first constant regressors; candidate `i` predicts `i`.
pub fn candidates(n: usize) -> Vec<Arc<dyn Candidate>> {
    (0..n)
        .map(|i| {
            Arc::new(ScriptedCandidate::constant(
                &format!("c{i}"),
                i as f64,
                1.0 - i as f64 / 10.0,
            )) as Arc<dyn Candidate>
        })
        .collect()
}
