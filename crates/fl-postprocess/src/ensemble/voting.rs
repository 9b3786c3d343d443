//! Weighted voting over fitted ensemble members.

use fl_types::{
    DataError, FeatureTable, FittedModel, FlResult, Labels, ProbabilityTable, ProblemType,
};

/// One fitted member and how many times selection picked it.
#[derive(Debug)]
pub struct VotingMember {
    pub id: String,
    pub weight: u32,
    pub model: Box<dyn FittedModel>,
}

/// Final ensemble model.
///
/// Classification averages member probabilities by weight (members without
/// probabilities vote with one-hot rows) and predicts the argmax class.
/// Regression predicts the weighted mean.
#[derive(Debug)]
pub struct VotingModel {
    problem_type: ProblemType,
    classes: Vec<String>,
    members: Vec<VotingMember>,
}

impl VotingModel {
    pub fn new(
        problem_type: ProblemType,
        classes: Vec<String>,
        members: Vec<VotingMember>,
    ) -> FlResult<Self> {
        if members.is_empty() {
            return Err(DataError::Empty {
                message: "a voting model needs at least one member".to_string(),
            }
            .into());
        }
        Ok(Self {
            problem_type,
            classes,
            members,
        })
    }

    pub fn members(&self) -> &[VotingMember] {
        &self.members
    }

    pub fn total_weight(&self) -> u32 {
        self.members.iter().map(|m| m.weight).sum()
    }

    fn averaged_probabilities(&self, x: &FeatureTable) -> FlResult<ProbabilityTable> {
        let total = f64::from(self.total_weight().max(1));
        let mut rows = vec![vec![0.0; self.classes.len()]; x.n_rows()];

        for member in &self.members {
            let table = match member.model.predict_proba(x) {
                Some(proba) => proba?.aligned_to(&self.classes),
                None => {
                    let predicted = member.model.predict(x)?;
                    ProbabilityTable::one_hot(&self.classes, predicted.as_categorical()?)
                }
            };
            check_rows(x, table.n_rows())?;
            let weight = f64::from(member.weight) / total;
            for (acc, row) in rows.iter_mut().zip(&table.rows) {
                for (a, p) in acc.iter_mut().zip(row) {
                    *a += weight * p;
                }
            }
        }

        Ok(ProbabilityTable {
            classes: self.classes.clone(),
            rows,
        })
    }

    fn averaged_values(&self, x: &FeatureTable) -> FlResult<Vec<f64>> {
        let total = f64::from(self.total_weight().max(1));
        let mut values = vec![0.0; x.n_rows()];
        for member in &self.members {
            let predicted = member.model.predict(x)?;
            let predicted = predicted.as_continuous()?;
            check_rows(x, predicted.len())?;
            let weight = f64::from(member.weight) / total;
            for (acc, v) in values.iter_mut().zip(predicted) {
                *acc += weight * v;
            }
        }
        Ok(values)
    }
}

/// Every member must answer with exactly one row per input row.
fn check_rows(x: &FeatureTable, predicted: usize) -> Result<(), DataError> {
    if predicted != x.n_rows() {
        return Err(DataError::RowMismatch {
            features: x.n_rows(),
            labels: predicted,
        });
    }
    Ok(())
}

impl FittedModel for VotingModel {
    fn predict(&self, x: &FeatureTable) -> FlResult<Labels> {
        match self.problem_type {
            ProblemType::Classification => {
                Ok(Labels::Categorical(self.averaged_probabilities(x)?.argmax()))
            }
            ProblemType::Regression => Ok(Labels::Continuous(self.averaged_values(x)?)),
        }
    }

    fn predict_proba(&self, x: &FeatureTable) -> Option<FlResult<ProbabilityTable>> {
        match self.problem_type {
            ProblemType::Classification => Some(self.averaged_probabilities(x)),
            ProblemType::Regression => None,
        }
    }
}
