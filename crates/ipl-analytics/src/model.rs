// Regressor seam plus a ridge linear regression over standardized features.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FeatureVector, FEATURE_COLUMNS, FEATURE_COUNT};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training split is empty")]
    EmptyTrainingSet,

    #[error("feature matrix has {rows} rows but target has {targets} values")]
    ShapeMismatch { rows: usize, targets: usize },

    #[error("normal equations are singular at column `{column}`")]
    Singular { column: String },

    #[error("invalid l2 penalty {0}")]
    InvalidPenalty(f64),
}

/// A fitted model that maps a feature vector to a runs estimate.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> f64;

    fn predict_batch(&self, rows: &[FeatureVector]) -> Vec<f64> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

const MIN_STD: f64 = 1e-9;
const PIVOT_EPS: f64 = 1e-12;

/// Ridge regression fit in closed form on z-scored columns. The intercept
/// is not penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    pub l2: f64,
}

impl RidgeRegressor {
    pub fn fit(x: &[FeatureVector], y: &[f64], l2: f64) -> Result<Self, TrainError> {
        if x.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(TrainError::ShapeMismatch {
                rows: x.len(),
                targets: y.len(),
            });
        }
        if !l2.is_finite() || l2 < 0.0 {
            return Err(TrainError::InvalidPenalty(l2));
        }

        let n = x.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        for row in x {
            for (j, value) in row.iter().enumerate() {
                means[j] += value / n;
            }
        }
        let mut stds = [0.0; FEATURE_COUNT];
        for row in x {
            for (j, value) in row.iter().enumerate() {
                stds[j] += (value - means[j]).powi(2) / n;
            }
        }
        for s in stds.iter_mut() {
            *s = s.sqrt();
        }
        let y_mean = y.iter().sum::<f64>() / n;

        // Normal equations (ZᵀZ + l2·I) β = Zᵀ(y - ȳ) on standardized Z.
        let mut a = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        let mut b = [0.0; FEATURE_COUNT];
        for (row, target) in x.iter().zip(y) {
            let z = standardize(row, &means, &stds);
            let centered = target - y_mean;
            for i in 0..FEATURE_COUNT {
                b[i] += z[i] * centered;
                for j in 0..FEATURE_COUNT {
                    a[i][j] += z[i] * z[j];
                }
            }
        }
        for i in 0..FEATURE_COUNT {
            a[i][i] += l2;
            // Constant columns standardize to zero; pin their weight at 0.
            if stds[i] < MIN_STD {
                a[i][i] += 1.0;
            }
        }

        let coeffs = solve(a, b)?;

        Ok(Self {
            feature_names: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            feature_means: means.to_vec(),
            feature_stds: stds.to_vec(),
            coeffs: coeffs.to_vec(),
            intercept: y_mean,
            l2,
        })
    }

    /// Coefficients paired with their column names.
    pub fn named_coefficients(&self) -> Vec<(String, f64)> {
        self.feature_names
            .iter()
            .cloned()
            .zip(self.coeffs.iter().copied())
            .collect()
    }
}

impl Regressor for RidgeRegressor {
    fn predict(&self, features: &FeatureVector) -> f64 {
        let mut total = self.intercept;
        for (idx, raw) in features.iter().enumerate() {
            let coeff = self.coeffs.get(idx).copied().unwrap_or(0.0);
            let mean = self.feature_means.get(idx).copied().unwrap_or(0.0);
            let std = self.feature_stds.get(idx).copied().unwrap_or(1.0);
            if std < MIN_STD {
                continue;
            }
            total += coeff * (raw - mean) / std;
        }
        total
    }
}

fn standardize(
    row: &FeatureVector,
    means: &[f64; FEATURE_COUNT],
    stds: &[f64; FEATURE_COUNT],
) -> FeatureVector {
    let mut z = [0.0; FEATURE_COUNT];
    for j in 0..FEATURE_COUNT {
        z[j] = if stds[j] < MIN_STD {
            0.0
        } else {
            (row[j] - means[j]) / stds[j]
        };
    }
    z
}

/// Gaussian elimination with partial pivoting.
fn solve(
    mut a: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    mut b: [f64; FEATURE_COUNT],
) -> Result<[f64; FEATURE_COUNT], TrainError> {
    for col in 0..FEATURE_COUNT {
        let pivot = (col..FEATURE_COUNT)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPS {
            return Err(TrainError::Singular {
                column: FEATURE_COLUMNS[col].to_string(),
            });
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..FEATURE_COUNT {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..FEATURE_COUNT {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; FEATURE_COUNT];
    for row in (0..FEATURE_COUNT).rev() {
        let tail: f64 = (row + 1..FEATURE_COUNT).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
