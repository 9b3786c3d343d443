//! Greedy ensemble selection with replacement over out-of-fold predictions.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use fl_types::{DataError, FlResult, Labels, ProbabilityTable, ValidationPredictions};

use crate::deadline::Deadline;
use crate::metrics::Metric;

/// Outcome of ensemble selection: pool indices with their pick counts.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleSelection {
    /// `(pool index, weight)` in order of first pick.
    pub weights: Vec<(usize, u32)>,
    /// Metric value of the final weighted average.
    pub score: f64,
    /// Total picks made, i.e. the sum of weights.
    pub picks: usize,
    /// Whether selection stopped early because the deadline passed.
    pub truncated: bool,
}

/// Flattened predictions so regression and classification average alike.
#[derive(Debug, Clone)]
enum Layout {
    Regression,
    Classification { classes: Vec<String> },
}

impl Layout {
    fn for_labels(y: &Labels) -> Self {
        match y {
            Labels::Continuous(_) => Self::Regression,
            Labels::Categorical(_) => Self::Classification { classes: y.classes() },
        }
    }

    fn flatten(&self, predictions: &ValidationPredictions) -> Vec<f64> {
        match (self, predictions) {
            (Self::Regression, ValidationPredictions::Regression(values)) => values.clone(),
            (Self::Classification { classes }, ValidationPredictions::Classification(table)) => {
                table.aligned_to(classes).rows.into_iter().flatten().collect()
            }
            // Mismatched kinds are filtered out before selection; score them as missing.
            (Self::Regression, other) => vec![f64::NAN; other.len()],
            (Self::Classification { classes }, other) => vec![0.0; other.len() * classes.len()],
        }
    }

    fn rebuild(&self, flat: Vec<f64>) -> ValidationPredictions {
        match self {
            Self::Regression => ValidationPredictions::Regression(flat),
            Self::Classification { classes } => {
                let width = classes.len().max(1);
                let rows = flat.chunks(width).map(<[f64]>::to_vec).collect();
                ValidationPredictions::Classification(ProbabilityTable {
                    classes: classes.clone(),
                    rows,
                })
            }
        }
    }
}

/// Pick up to `ensemble_size` members (with replacement) from `pool`.
///
/// Starts from the best single member, then repeatedly adds whichever member
/// maximizes `metric` on the running average. Exact ties are broken with
/// `rng`. Stops early once `deadline` expires, always keeping at least one
/// pick. An empty `pool` is rejected with [`DataError::Empty`].
pub fn select_ensemble(
    pool: &[&ValidationPredictions],
    y: &Labels,
    metric: Metric,
    ensemble_size: usize,
    deadline: &Deadline,
    rng: &mut ChaCha8Rng,
) -> FlResult<EnsembleSelection> {
    if pool.is_empty() {
        return Err(DataError::Empty {
            message: "ensemble selection needs at least one pool member".to_string(),
        }
        .into());
    }

    let layout = Layout::for_labels(y);
    let flat: Vec<Vec<f64>> = pool.iter().map(|p| layout.flatten(p)).collect();
    let width = flat.first().map(Vec::len).unwrap_or(0);

    let mut sum = vec![0.0; width];
    let mut counts = vec![0u32; pool.len()];
    let mut order: Vec<usize> = Vec::new();
    let mut picks = 0usize;
    let mut score = f64::NEG_INFINITY;
    let mut truncated = false;

    while picks < ensemble_size.max(1) {
        if picks > 0 && deadline.is_expired() {
            truncated = true;
            break;
        }

        let divisor = (picks + 1) as f64;
        let mut best_score = f64::NEG_INFINITY;
        let mut best: Vec<usize> = Vec::new();
        for (i, member) in flat.iter().enumerate() {
            let averaged: Vec<f64> = sum
                .iter()
                .zip(member)
                .map(|(s, m)| (s + m) / divisor)
                .collect();
            let candidate_score = metric.score(y, &layout.rebuild(averaged))?;
            if candidate_score > best_score {
                best_score = candidate_score;
                best.clear();
                best.push(i);
            } else if candidate_score == best_score {
                best.push(i);
            }
        }

        // Every score was NaN; keep the first member rather than nothing.
        let chosen = best.choose(rng).copied().unwrap_or(0);
        for (s, m) in sum.iter_mut().zip(&flat[chosen]) {
            *s += m;
        }
        if counts[chosen] == 0 {
            order.push(chosen);
        }
        counts[chosen] += 1;
        picks += 1;
        score = best_score;
        debug!("Ensemble pick {}: pool member {} (score {:.6})", picks, chosen, score);
    }

    Ok(EnsembleSelection {
        weights: order.into_iter().map(|i| (i, counts[i])).collect(),
        score,
        picks,
        truncated,
    })
}
