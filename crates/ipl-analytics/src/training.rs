// Season-split training run: frame → encodings → regressor → artifacts.

use std::path::Path;

use ipl_core::db::Database;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::artifacts::{self, ArtifactError, ModelArtifact, TrainingMetrics, MODEL_SCHEMA_VERSION};
use crate::encoding::EncodingTable;
use crate::features::{
    build_training_frame, FeatureRow, FeatureVector, TrainingFrame, FEATURE_COLUMNS, TARGET_COLUMN,
};
use crate::model::{Regressor, RidgeRegressor, TrainError};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("failed to read training data: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Fit(#[from] TrainError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Knobs for one training run.
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub recent_window: usize,
    /// First season held out for evaluation.
    pub test_season_start: i32,
    pub l2: f64,
    /// Shared by both artifacts.
    pub version: String,
}

/// What a training run produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: String,
    pub metrics: TrainingMetrics,
    pub fill_mean: f64,
    pub coefficients: Vec<(String, f64)>,
}

pub struct TrainedModel {
    pub encodings: EncodingTable,
    pub artifact: ModelArtifact,
}

impl TrainedModel {
    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            version: self.artifact.version.clone(),
            metrics: self.artifact.metrics.clone(),
            fill_mean: self.artifact.fill_mean,
            coefficients: self.artifact.model.named_coefficients(),
        }
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    Some(total / actual.len() as f64)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Some((total / actual.len() as f64).sqrt())
}

fn matrix(encodings: &EncodingTable, rows: &[&FeatureRow]) -> (Vec<FeatureVector>, Vec<f64>) {
    rows.iter()
        .map(|row| (encodings.encode_row(row), row.target()))
        .unzip()
}

/// Fit encodings and the regressor on a prepared frame.
pub fn train_on_frame(
    frame: &TrainingFrame,
    options: &TrainingOptions,
) -> Result<TrainedModel, TrainError> {
    let (train_rows, test_rows): (Vec<&FeatureRow>, Vec<&FeatureRow>) = frame
        .rows
        .iter()
        .partition(|row| row.record.season < options.test_season_start);
    info!(
        train = train_rows.len(),
        test = test_rows.len(),
        test_season_start = options.test_season_start,
        "split training frame"
    );
    if train_rows.is_empty() {
        return Err(TrainError::EmptyTrainingSet);
    }

    // Encodings come from the training split only.
    let encodings = EncodingTable::fit(train_rows.iter().copied(), options.version.clone());

    let (x_train, y_train) = matrix(&encodings, &train_rows);
    let model = RidgeRegressor::fit(&x_train, &y_train, options.l2)?;

    let (x_test, y_test) = matrix(&encodings, &test_rows);
    let train_mean = y_train.iter().sum::<f64>() / y_train.len() as f64;
    let baseline = vec![train_mean; y_test.len()];
    let predictions = model.predict_batch(&x_test);

    let metrics = TrainingMetrics {
        train_samples: x_train.len(),
        test_samples: x_test.len(),
        baseline_mae: mean_absolute_error(&y_test, &baseline),
        mae: mean_absolute_error(&y_test, &predictions),
        rmse: root_mean_squared_error(&y_test, &predictions),
    };
    info!(
        baseline_mae = ?metrics.baseline_mae,
        mae = ?metrics.mae,
        rmse = ?metrics.rmse,
        "evaluated on held-out seasons"
    );

    let artifact = ModelArtifact {
        schema_version: MODEL_SCHEMA_VERSION,
        version: options.version.clone(),
        encoding_version: encodings.version.clone(),
        feature_columns: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        target: TARGET_COLUMN.to_string(),
        fill_mean: frame.global_mean,
        recent_window: frame.recent_window,
        test_season_start: options.test_season_start,
        model,
        metrics,
    };

    Ok(TrainedModel {
        encodings,
        artifact,
    })
}

/// Full training run against the store, persisting both artifacts to
/// `artifacts_dir`.
pub fn train(
    db: &Database,
    options: &TrainingOptions,
    artifacts_dir: &Path,
) -> Result<TrainingReport, TrainingError> {
    let frame = build_training_frame(db, options.recent_window)?;
    let trained = train_on_frame(&frame, options)?;
    artifacts::save_artifacts(artifacts_dir, &trained.encodings, &trained.artifact)?;
    Ok(trained.report())
}
