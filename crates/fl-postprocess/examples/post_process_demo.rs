//! Drives both post-processing strategies over a toy regression search.
//!
//! Run with `RUST_LOG=debug` to see every lifecycle step.

use std::sync::Arc;
use std::time::Duration;

use fl_postprocess::{PostProcessingConfig, PostProcessingMethod};
use fl_types::{
    Candidate, Estimator, FeatureTable, FitOptions, FittedModel, FlResult, Labels, ProblemType,
    SearchContext, ValidationPredictions,
};

/// Least-squares line through one feature, optionally shrunk towards the mean.
#[derive(Debug)]
struct LineCandidate {
    id: String,
    feature: usize,
    shrinkage: f64,
    validation: ValidationPredictions,
}

#[derive(Debug)]
struct LineModel {
    feature: usize,
    intercept: f64,
    slope: f64,
}

struct LineEstimator {
    feature: usize,
    shrinkage: f64,
}

fn fit_line(x: &[f64], y: &[f64], shrinkage: f64) -> (f64, f64) {
    let n = x.len().max(1) as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let sxx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum::<f64>() + shrinkage;
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (my - slope * mx, slope)
}

impl Estimator for LineEstimator {
    fn fit(
        self: Box<Self>,
        x: &FeatureTable,
        y: &Labels,
        _options: &FitOptions,
    ) -> FlResult<Box<dyn FittedModel>> {
        let column: Vec<f64> = x.rows().iter().map(|r| r[self.feature]).collect();
        let (intercept, slope) = fit_line(&column, y.as_continuous()?, self.shrinkage);
        Ok(Box::new(LineModel {
            feature: self.feature,
            intercept,
            slope,
        }))
    }
}

impl FittedModel for LineModel {
    fn predict(&self, x: &FeatureTable) -> FlResult<Labels> {
        Ok(Labels::Continuous(
            x.rows()
                .iter()
                .map(|r| self.intercept + self.slope * r[self.feature])
                .collect(),
        ))
    }
}

impl Candidate for LineCandidate {
    fn id(&self) -> &str {
        &self.id
    }

    fn fitness(&self) -> f64 {
        0.0
    }

    fn validation_predictions(&self) -> Option<&ValidationPredictions> {
        Some(&self.validation)
    }

    fn realize(&self) -> Box<dyn Estimator> {
        Box::new(LineEstimator {
            feature: self.feature,
            shrinkage: self.shrinkage,
        })
    }
}

/// Two-fold out-of-fold predictions, standing in for what the search caches.
fn out_of_fold(x: &FeatureTable, y: &[f64], feature: usize, shrinkage: f64) -> Vec<f64> {
    let column: Vec<f64> = x.rows().iter().map(|r| r[feature]).collect();
    let mut predictions = vec![0.0; y.len()];
    for fold in 0..2 {
        let (train_x, train_y): (Vec<f64>, Vec<f64>) = column
            .iter()
            .zip(y)
            .enumerate()
            .filter(|(i, _)| i % 2 != fold)
            .map(|(_, (a, b))| (*a, *b))
            .unzip();
        let (intercept, slope) = fit_line(&train_x, &train_y, shrinkage);
        for (i, value) in column.iter().enumerate().filter(|(i, _)| i % 2 == fold) {
            predictions[i] = intercept + slope * value;
        }
    }
    predictions
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fl_postprocess=info".into()),
        )
        .init();

    let rows: Vec<Vec<f64>> = (0..40)
        .map(|i| {
            let a = i as f64 / 4.0;
            vec![a, (i % 7) as f64]
        })
        .collect();
    let x = FeatureTable::new(rows)?;
    let targets: Vec<f64> = x.rows().iter().map(|r| 2.0 * r[0] + 0.5 * r[1]).collect();
    let y = Labels::Continuous(targets.clone());

    let mut selection: Vec<Arc<dyn Candidate>> = Vec::new();
    for (feature, shrinkage) in [(0, 0.0), (0, 50.0), (1, 0.0)] {
        selection.push(Arc::new(LineCandidate {
            id: format!("line(feature={feature},shrinkage={shrinkage})"),
            feature,
            shrinkage,
            validation: ValidationPredictions::Regression(out_of_fold(
                &x, &targets, feature, shrinkage,
            )),
        }));
    }

    let context = SearchContext::new(ProblemType::Regression, "neg_mean_squared_error")
        .with_time(Duration::from_secs(60), Duration::from_secs(42))
        .with_evaluated_candidates(selection.len())
        .with_shape(x.n_rows(), x.n_features())
        .with_seed(7);

    for config in [
        PostProcessingConfig::new(PostProcessingMethod::BestFit),
        PostProcessingConfig::new(PostProcessingMethod::Ensemble)
            .with_hyperparameter("ensemble_size", 5),
    ] {
        let mut processor = config.build()?;
        processor.dynamic_defaults(&context)?;
        let budget = processor.budget_for(context.total_time);

        let outcome = processor.post_process(&x, &y, budget, &selection)?;
        let predicted = outcome.model.predict(&x)?;
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        println!("first predictions: {:?}", &predicted.as_continuous()?[..4]);
    }

    Ok(())
}
