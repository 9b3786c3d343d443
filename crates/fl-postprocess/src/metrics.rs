//! Scoring metrics used to rank ensembles. Every metric is "higher is better".

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use fl_types::{
    DataError, FlResult, HyperparameterError, Labels, ProblemType, ValidationPredictions,
};

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    NegLogLoss,
    R2,
    NegMeanSquaredError,
    NegMeanAbsoluteError,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::NegLogLoss => "neg_log_loss",
            Self::R2 => "r2",
            Self::NegMeanSquaredError => "neg_mean_squared_error",
            Self::NegMeanAbsoluteError => "neg_mean_absolute_error",
        }
    }

    /// The kind of problem this metric scores.
    pub fn problem_type(&self) -> ProblemType {
        match self {
            Self::Accuracy | Self::NegLogLoss => ProblemType::Classification,
            Self::R2 | Self::NegMeanSquaredError | Self::NegMeanAbsoluteError => {
                ProblemType::Regression
            }
        }
    }

    /// Score `predictions` against the true labels `y`.
    pub fn score(&self, y: &Labels, predictions: &ValidationPredictions) -> FlResult<f64> {
        if y.len() != predictions.len() {
            return Err(DataError::RowMismatch {
                features: predictions.len(),
                labels: y.len(),
            }
            .into());
        }
        if y.is_empty() {
            return Err(DataError::Empty {
                message: format!("cannot compute {} on zero rows", self.name()),
            }
            .into());
        }

        match (self, predictions) {
            (Self::Accuracy, ValidationPredictions::Classification(table)) => {
                let truth = y.as_categorical()?;
                let hits = table
                    .argmax()
                    .iter()
                    .zip(truth)
                    .filter(|(predicted, actual)| predicted == actual)
                    .count();
                Ok(hits as f64 / truth.len() as f64)
            }
            (Self::NegLogLoss, ValidationPredictions::Classification(table)) => {
                let truth = y.as_categorical()?;
                let total: f64 = table
                    .rows
                    .iter()
                    .zip(truth)
                    .map(|(row, actual)| {
                        let p = table
                            .classes
                            .iter()
                            .position(|c| c == actual)
                            .and_then(|j| row.get(j).copied())
                            .unwrap_or(0.0);
                        p.clamp(LOG_LOSS_EPS, 1.0).ln()
                    })
                    .sum();
                Ok(total / truth.len() as f64)
            }
            (Self::R2, ValidationPredictions::Regression(values)) => {
                let truth = y.as_continuous()?;
                let mean = truth.iter().sum::<f64>() / truth.len() as f64;
                let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
                let ss_res: f64 = truth
                    .iter()
                    .zip(values)
                    .map(|(t, p)| (t - p).powi(2))
                    .sum();
                if ss_tot == 0.0 {
                    // Constant target: perfect fit scores 1, anything else 0.
                    return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
                }
                Ok(1.0 - ss_res / ss_tot)
            }
            (Self::NegMeanSquaredError, ValidationPredictions::Regression(values)) => {
                let truth = y.as_continuous()?;
                let mse = truth
                    .iter()
                    .zip(values)
                    .map(|(t, p)| (t - p).powi(2))
                    .sum::<f64>()
                    / truth.len() as f64;
                Ok(-mse)
            }
            (Self::NegMeanAbsoluteError, ValidationPredictions::Regression(values)) => {
                let truth = y.as_continuous()?;
                let mae = truth
                    .iter()
                    .zip(values)
                    .map(|(t, p)| (t - p).abs())
                    .sum::<f64>()
                    / truth.len() as f64;
                Ok(-mae)
            }
            _ => Err(DataError::LabelKind {
                expected: match self.problem_type() {
                    ProblemType::Classification => "classification predictions",
                    ProblemType::Regression => "regression predictions",
                },
                actual: match predictions {
                    ValidationPredictions::Classification(_) => "classification predictions",
                    ValidationPredictions::Regression(_) => "regression predictions",
                },
            }
            .into()),
        }
    }
}

impl FromStr for Metric {
    type Err = HyperparameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Self::Accuracy),
            "neg_log_loss" | "log_loss" => Ok(Self::NegLogLoss),
            "r2" => Ok(Self::R2),
            "neg_mean_squared_error" | "mean_squared_error" => Ok(Self::NegMeanSquaredError),
            "neg_mean_absolute_error" | "mean_absolute_error" => Ok(Self::NegMeanAbsoluteError),
            other => Err(HyperparameterError::InvalidValue {
                name: "metric".to_string(),
                message: format!("unknown metric '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
