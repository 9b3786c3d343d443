//! In-memory tabular data handed to post-processing.

use serde::{Deserialize, Serialize};

use crate::errors::DataError;

/// Whether the search is solving a classification or a regression problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Classification,
    Regression,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::Regression => write!(f, "regression"),
        }
    }
}

/// Rectangular table of numeric features, one `Vec` per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    rows: Vec<Vec<f64>>,
    n_features: usize,
}

impl FeatureTable {
    /// Build a table, rejecting ragged rows.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, DataError> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_features) {
            return Err(DataError::Ragged {
                row,
                expected: n_features,
                actual: r.len(),
            });
        }
        Ok(Self { rows, n_features })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

/// Target values, row-aligned with a [`FeatureTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Labels {
    Categorical(Vec<String>),
    Continuous(Vec<f64>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Self::Categorical(v) => v.len(),
            Self::Continuous(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Categorical(_) => "categorical",
            Self::Continuous(_) => "continuous",
        }
    }

    /// The problem type these labels imply.
    pub fn problem_type(&self) -> ProblemType {
        match self {
            Self::Categorical(_) => ProblemType::Classification,
            Self::Continuous(_) => ProblemType::Regression,
        }
    }

    pub fn as_categorical(&self) -> Result<&[String], DataError> {
        match self {
            Self::Categorical(v) => Ok(v),
            other => Err(DataError::LabelKind {
                expected: "categorical",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_continuous(&self) -> Result<&[f64], DataError> {
        match self {
            Self::Continuous(v) => Ok(v),
            other => Err(DataError::LabelKind {
                expected: "continuous",
                actual: other.kind(),
            }),
        }
    }

    /// Distinct class names in sorted order (empty for continuous labels).
    pub fn classes(&self) -> Vec<String> {
        match self {
            Self::Categorical(v) => {
                let mut classes: Vec<String> = v.clone();
                classes.sort();
                classes.dedup();
                classes
            }
            Self::Continuous(_) => Vec::new(),
        }
    }

    /// Fail unless these labels have one entry per feature row.
    pub fn check_aligned(&self, x: &FeatureTable) -> Result<(), DataError> {
        if self.len() != x.n_rows() {
            return Err(DataError::RowMismatch {
                features: x.n_rows(),
                labels: self.len(),
            });
        }
        Ok(())
    }
}

/// Per-row class probabilities; column `j` belongs to `classes[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    pub classes: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ProbabilityTable {
    pub fn new(classes: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, DataError> {
        if let Some((row, r)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != classes.len())
        {
            return Err(DataError::Ragged {
                row,
                expected: classes.len(),
                actual: r.len(),
            });
        }
        Ok(Self { classes, rows })
    }

    /// One-hot encode hard label predictions over `classes`.
    /// Labels outside `classes` become all-zero rows.
    pub fn one_hot(classes: &[String], labels: &[String]) -> Self {
        let rows = labels
            .iter()
            .map(|label| {
                classes
                    .iter()
                    .map(|c| if c == label { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Self {
            classes: classes.to_vec(),
            rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Most probable class per row. Ties resolve to the first class.
    pub fn argmax(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold(None::<(usize, f64)>, |best, (j, &p)| match best {
                        Some((_, bp)) if bp >= p => best,
                        _ => Some((j, p)),
                    })
                    .map(|(j, _)| j)
                    .unwrap_or(0);
                self.classes.get(best).cloned().unwrap_or_default()
            })
            .collect()
    }

    /// Probabilities re-ordered onto `classes`; missing classes get 0.
    pub fn aligned_to(&self, classes: &[String]) -> Self {
        let index: Vec<Option<usize>> = classes
            .iter()
            .map(|c| self.classes.iter().position(|own| own == c))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                index
                    .iter()
                    .map(|i| i.and_then(|i| row.get(i).copied()).unwrap_or(0.0))
                    .collect()
            })
            .collect();
        Self {
            classes: classes.to_vec(),
            rows,
        }
    }
}

/// Out-of-fold predictions a candidate accumulated during search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPredictions {
    Regression(Vec<f64>),
    Classification(ProbabilityTable),
}

impl ValidationPredictions {
    pub fn len(&self) -> usize {
        match self {
            Self::Regression(v) => v.len(),
            Self::Classification(t) => t.n_rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn problem_type(&self) -> ProblemType {
        match self {
            Self::Regression(_) => ProblemType::Regression,
            Self::Classification(_) => ProblemType::Classification,
        }
    }
}
