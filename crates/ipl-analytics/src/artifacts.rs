// On-disk model and encoding artifacts, versioned as a pair.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::encoding::EncodingTable;
use crate::features::FEATURE_COLUMNS;
use crate::model::RidgeRegressor;

pub const MODEL_FILE: &str = "model.json";
pub const ENCODINGS_FILE: &str = "encodings.json";

/// Format version of the model file.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {path}")]
    Missing { path: PathBuf },

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed artifact {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(
        "model was trained against encodings `{model_encoding_version}` but encodings file is `{encoding_version}`; retrain"
    )]
    VersionMismatch {
        model_encoding_version: String,
        encoding_version: String,
    },

    #[error("model feature columns {found:?} do not match expected {expected:?}; retrain")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("unsupported {artifact} schema version {found} (expected {expected})")]
    SchemaVersion {
        artifact: &'static str,
        found: u32,
        expected: u32,
    },

    #[error("encodings file is missing categorical fields")]
    IncompleteEncodings,
}

/// Held-out evaluation recorded at training time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_samples: usize,
    pub test_samples: usize,
    /// MAE of always predicting the training mean.
    pub baseline_mae: Option<f64>,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
}

/// Everything serving needs besides the encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub version: String,
    pub encoding_version: String,
    pub feature_columns: Vec<String>,
    pub target: String,
    /// Mean runs over the full training frame; stands in for rolling
    /// features of entities with no history.
    pub fill_mean: f64,
    pub recent_window: usize,
    pub test_season_start: i32,
    pub model: RidgeRegressor,
    pub metrics: TrainingMetrics,
}

/// Version id for a training run, e.g. `ipl_20240312_094501_123`.
pub fn generate_version() -> String {
    chrono::Utc::now().format("ipl_%Y%m%d_%H%M%S_%3f").to_string()
}

fn expected_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ArtifactError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, text).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::Missing {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| ArtifactError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write both artifacts into `dir`, creating it if needed.
pub fn save_artifacts(
    dir: &Path,
    encodings: &EncodingTable,
    model: &ModelArtifact,
) -> Result<(), ArtifactError> {
    std::fs::create_dir_all(dir).map_err(|e| ArtifactError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    write_json(&dir.join(ENCODINGS_FILE), encodings)?;
    write_json(&dir.join(MODEL_FILE), model)?;
    info!(dir = %dir.display(), version = %model.version, "saved artifacts");
    Ok(())
}

/// Check that a model and encoding table belong together.
pub fn verify_pair(encodings: &EncodingTable, model: &ModelArtifact) -> Result<(), ArtifactError> {
    if model.schema_version != MODEL_SCHEMA_VERSION {
        return Err(ArtifactError::SchemaVersion {
            artifact: "model",
            found: model.schema_version,
            expected: MODEL_SCHEMA_VERSION,
        });
    }
    if encodings.schema_version != crate::encoding::ENCODING_SCHEMA_VERSION {
        return Err(ArtifactError::SchemaVersion {
            artifact: "encodings",
            found: encodings.schema_version,
            expected: crate::encoding::ENCODING_SCHEMA_VERSION,
        });
    }
    if model.encoding_version != encodings.version {
        return Err(ArtifactError::VersionMismatch {
            model_encoding_version: model.encoding_version.clone(),
            encoding_version: encodings.version.clone(),
        });
    }
    let expected = expected_columns();
    if model.feature_columns != expected || model.model.feature_names != expected {
        return Err(ArtifactError::ColumnMismatch {
            expected,
            found: model.feature_columns.clone(),
        });
    }
    if !encodings.is_complete() {
        return Err(ArtifactError::IncompleteEncodings);
    }
    Ok(())
}

/// Load and cross-check both artifacts from `dir`.
pub fn load_artifacts(dir: &Path) -> Result<(EncodingTable, ModelArtifact), ArtifactError> {
    let encodings: EncodingTable = read_json(&dir.join(ENCODINGS_FILE))?;
    let model: ModelArtifact = read_json(&dir.join(MODEL_FILE))?;
    verify_pair(&encodings, &model)?;
    info!(version = %model.version, "loaded artifacts");
    Ok((encodings, model))
}
