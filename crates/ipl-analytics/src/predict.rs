// Serving path: request → feature vector → regressor → clamped estimate.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use ipl_core::db::Database;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifacts::{self, ArtifactError};
use crate::encoding::{CategoricalField, EncodingTable};
use crate::features::{FeatureVector, RollingSnapshot};
use crate::model::Regressor;
use crate::stats::round2;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid `{field}`: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] ArtifactError),

    #[error("failed to read match history: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Match context for one innings to be predicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub season: i32,
    pub venue: String,
    pub team: String,
    pub opposition: String,
    pub toss_winner: String,
    pub toss_choice: String,
    pub innings: i32,
}

impl PredictionRequest {
    pub fn validate(&self) -> Result<(), PredictError> {
        if !(1000..=9999).contains(&self.season) {
            return Err(PredictError::InvalidField {
                field: "season",
                message: format!("must be a four-digit year, got {}", self.season),
            });
        }
        if !matches!(self.innings, 1 | 2) {
            return Err(PredictError::InvalidField {
                field: "innings",
                message: format!("must be 1 or 2, got {}", self.innings),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_runs: f64,
}

/// Build the model input for `request` in training column order.
///
/// Unseen categories take the field's unknown code; teams and venues with no
/// history take `fill_mean` for their rolling averages.
pub fn assemble_feature_vector(
    request: &PredictionRequest,
    encodings: &EncodingTable,
    snapshot: &RollingSnapshot,
    fill_mean: f64,
) -> Result<FeatureVector, PredictError> {
    request.validate()?;
    let [team_avg_runs_5, team_avg_runs_all, venue_avg_runs] =
        snapshot.features_for(request.team.trim(), request.venue.trim(), fill_mean);
    Ok([
        f64::from(request.season),
        f64::from(encodings.encode(CategoricalField::Venue, &request.venue)),
        f64::from(encodings.encode(CategoricalField::Team, &request.team)),
        f64::from(encodings.encode(CategoricalField::Opposition, &request.opposition)),
        f64::from(encodings.encode(CategoricalField::TossWinner, &request.toss_winner)),
        f64::from(encodings.encode(CategoricalField::TossChoice, &request.toss_choice)),
        f64::from(request.innings),
        team_avg_runs_5,
        team_avg_runs_all,
        venue_avg_runs,
    ])
}

/// Run the regressor and turn its raw output into a reportable estimate.
pub fn predict_runs(regressor: &dyn Regressor, features: &FeatureVector) -> f64 {
    let raw = regressor.predict(features);
    if raw.is_finite() {
        round2(raw.max(0.0))
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// A regressor together with the encodings and fill value it was trained with.
pub struct LoadedModel {
    pub version: String,
    pub encodings: EncodingTable,
    pub regressor: Box<dyn Regressor>,
    pub fill_mean: f64,
    pub recent_window: usize,
}

struct CachedSnapshot {
    built_at: Instant,
    snapshot: Arc<RollingSnapshot>,
}

/// Long-lived serving handle. The model is loaded on first use and kept for
/// the life of the process; the rolling snapshot is rebuilt from the store
/// once it is older than the configured TTL.
pub struct Predictor {
    artifacts_dir: PathBuf,
    snapshot_ttl: Duration,
    model: OnceLock<LoadedModel>,
    snapshot: Mutex<Option<CachedSnapshot>>,
}

impl Predictor {
    pub fn new(artifacts_dir: impl Into<PathBuf>, snapshot_ttl: Duration) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            snapshot_ttl,
            model: OnceLock::new(),
            snapshot: Mutex::new(None),
        }
    }

    /// A predictor around an already loaded model.
    pub fn with_model(model: LoadedModel, snapshot_ttl: Duration) -> Self {
        Self {
            artifacts_dir: PathBuf::new(),
            snapshot_ttl,
            model: OnceLock::from(model),
            snapshot: Mutex::new(None),
        }
    }

    /// The loaded model, reading artifacts on first call. Concurrent first
    /// calls may each read the files; only one result is kept.
    pub fn model(&self) -> Result<&LoadedModel, PredictError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        let (encodings, artifact) = artifacts::load_artifacts(&self.artifacts_dir)?;
        let loaded = LoadedModel {
            version: artifact.version,
            encodings,
            regressor: Box::new(artifact.model),
            fill_mean: artifact.fill_mean,
            recent_window: artifact.recent_window,
        };
        Ok(self.model.get_or_init(|| loaded))
    }

    /// The cached snapshot, rebuilt when stale. The store read happens
    /// outside the cache lock; concurrent rebuilds each install their own
    /// result and the last one wins.
    fn snapshot(&self, db: &Database, recent_window: usize) -> Result<Arc<RollingSnapshot>, PredictError> {
        if let Some(entry) = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if entry.built_at.elapsed() < self.snapshot_ttl {
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        let built_at = Instant::now();
        let snapshot = Arc::new(RollingSnapshot::from_store(db, recent_window)?);
        debug!(innings = snapshot.innings_seen(), "rebuilt rolling snapshot");

        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedSnapshot {
            built_at,
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next request rebuilds it.
    pub fn invalidate_snapshot(&self) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn predict(&self, db: &Database, request: &PredictionRequest) -> Result<Prediction, PredictError> {
        request.validate()?;
        let model = self.model()?;
        let snapshot = self.snapshot(db, model.recent_window)?;
        let features = assemble_feature_vector(request, &model.encodings, &snapshot, model.fill_mean)?;
        let predicted_runs = predict_runs(model.regressor.as_ref(), &features);
        info!(
            version = %model.version,
            team = %request.team,
            venue = %request.venue,
            predicted_runs,
            "prediction served"
        );
        Ok(Prediction { predicted_runs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_training_frame_from;
    use chrono::NaiveDate;
    use ipl_core::records::MatchRecord;

    struct Constant(f64);

    impl Regressor for Constant {
        fn predict(&self, _features: &FeatureVector) -> f64 {
            self.0
        }
    }

    /// Echoes the team_avg_runs_5 column.
    struct EchoRecentForm;

    impl Regressor for EchoRecentForm {
        fn predict(&self, features: &FeatureVector) -> f64 {
            features[7]
        }
    }

    fn history() -> Vec<MatchRecord> {
        [(1, 180, 170), (2, 150, 160), (3, 200, 140)]
            .iter()
            .map(|&(id, s1, s2)| MatchRecord {
                match_id: id,
                season: 2021,
                match_date: NaiveDate::from_ymd_opt(2021, 4, id as u32),
                venue_stadium: "Wankhede Stadium".into(),
                venue_city: "Mumbai".into(),
                team1_name: "Mumbai Indians".into(),
                team2_name: "Chennai Super Kings".into(),
                toss_winner: "Mumbai Indians".into(),
                toss_winner_choice: "bat".into(),
                match_winner: None,
                result_margin: None,
                team1_score: s1,
                team2_score: s2,
            })
            .collect()
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            season: 2023,
            venue: "Wankhede Stadium".into(),
            team: "Mumbai Indians".into(),
            opposition: "Chennai Super Kings".into(),
            toss_winner: "Mumbai Indians".into(),
            toss_choice: "bat".into(),
            innings: 1,
        }
    }

    fn encodings() -> EncodingTable {
        let frame = build_training_frame_from(&history(), 5);
        EncodingTable::fit(&frame.rows, "ipl_test")
    }

    fn loaded(regressor: Box<dyn Regressor>) -> LoadedModel {
        LoadedModel {
            version: "ipl_test".into(),
            encodings: encodings(),
            regressor,
            fill_mean: 155.0,
            recent_window: 5,
        }
    }

    // -- Validation --

    #[test]
    fn rejects_bad_innings_and_season() {
        let mut req = request();
        req.innings = 3;
        assert!(matches!(
            req.validate(),
            Err(PredictError::InvalidField { field: "innings", .. })
        ));
        let mut req = request();
        req.season = 23;
        assert!(matches!(
            req.validate(),
            Err(PredictError::InvalidField { field: "season", .. })
        ));
        assert!(request().validate().is_ok());
    }

    // -- Assembly --

    #[test]
    fn vector_uses_encodings_and_latest_snapshot() {
        let snapshot = RollingSnapshot::from_matches(&history(), 5);
        let v = assemble_feature_vector(&request(), &encodings(), &snapshot, 155.0).unwrap();
        // Mumbai Indians scored 180, 150, 200.
        let expected_recent = (180.0 + 150.0 + 200.0) / 3.0;
        // Wankhede saw all six innings.
        let expected_venue = (180.0 + 170.0 + 150.0 + 160.0 + 200.0 + 140.0) / 6.0;
        assert_eq!(v[0], 2023.0);
        assert_eq!(v[1], 0.0);
        assert_eq!(v[2], 1.0);
        assert_eq!(v[3], 0.0);
        assert_eq!(v[6], 1.0);
        assert!((v[7] - expected_recent).abs() < 1e-9);
        assert!((v[8] - expected_recent).abs() < 1e-9);
        assert!((v[9] - expected_venue).abs() < 1e-9);
    }

    #[test]
    fn unseen_entities_use_unknown_code_and_fill_mean() {
        let snapshot = RollingSnapshot::from_matches(&history(), 5);
        let table = encodings();
        let mut req = request();
        req.venue = "Narendra Modi Stadium".into();
        req.team = "Gujarat Titans".into();
        let v = assemble_feature_vector(&req, &table, &snapshot, 155.0).unwrap();
        assert_eq!(v[1], f64::from(table.unknown_code(CategoricalField::Venue)));
        assert_eq!(v[2], f64::from(table.unknown_code(CategoricalField::Team)));
        assert_eq!(&v[7..], &[155.0, 155.0, 155.0]);
    }

    // -- Output --

    #[test]
    fn negative_raw_output_clamps_to_zero() {
        let v = [0.0; 10];
        assert_eq!(predict_runs(&Constant(-20.0), &v), 0.0);
        assert_eq!(predict_runs(&Constant(f64::NAN), &v), 0.0);
        assert_eq!(predict_runs(&Constant(163.456), &v), 163.46);
    }

    #[test]
    fn predictor_clamps_stub_output() {
        let db = Database::open(":memory:").unwrap();
        let predictor = Predictor::with_model(loaded(Box::new(Constant(-20.0))), Duration::from_secs(60));
        let out = predictor.predict(&db, &request()).unwrap();
        assert_eq!(out.predicted_runs, 0.0);
    }

    #[test]
    fn missing_artifacts_are_fatal() {
        let db = Database::open(":memory:").unwrap();
        let dir = std::env::temp_dir().join("ipl_predict_test_no_artifacts");
        let _ = std::fs::remove_dir_all(&dir);
        let predictor = Predictor::new(&dir, Duration::from_secs(60));
        assert!(matches!(
            predictor.predict(&db, &request()),
            Err(PredictError::ModelUnavailable(ArtifactError::Missing { .. }))
        ));
    }

    #[test]
    fn invalid_request_fails_before_model_load() {
        let db = Database::open(":memory:").unwrap();
        let predictor = Predictor::new("/nonexistent", Duration::from_secs(60));
        let mut req = request();
        req.innings = 0;
        assert!(matches!(
            predictor.predict(&db, &req),
            Err(PredictError::InvalidField { .. })
        ));
    }

    // -- Snapshot cache --

    #[test]
    fn snapshot_cached_until_invalidated() {
        let db = Database::open(":memory:").unwrap();
        db.upsert_matches(&history()).unwrap();
        let predictor = Predictor::with_model(loaded(Box::new(EchoRecentForm)), Duration::from_secs(3600));

        let first = predictor.predict(&db, &request()).unwrap().predicted_runs;
        assert!((first - 176.67).abs() < 1e-9);

        // New history is not visible while the snapshot is fresh.
        let mut extra = history()[0].clone();
        extra.match_id = 4;
        extra.match_date = NaiveDate::from_ymd_opt(2021, 4, 4);
        extra.team1_score = 100;
        db.upsert_matches(&[extra]).unwrap();
        assert_eq!(predictor.predict(&db, &request()).unwrap().predicted_runs, first);

        predictor.invalidate_snapshot();
        let refreshed = predictor.predict(&db, &request()).unwrap().predicted_runs;
        // 180, 150, 200, 100
        assert!((refreshed - 157.5).abs() < 1e-9);
    }

    #[test]
    fn with_model_skips_artifact_loading() {
        let predictor = Predictor::with_model(loaded(Box::new(Constant(150.0))), Duration::from_secs(60));
        assert_eq!(predictor.model().unwrap().version, "ipl_test");
    }

    #[test]
    fn concurrent_requests_rebuild_without_blocking_each_other() {
        let db = Database::open(":memory:").unwrap();
        db.upsert_matches(&history()).unwrap();
        let predictor = Predictor::with_model(loaded(Box::new(EchoRecentForm)), Duration::ZERO);

        let (predictor_ref, db_ref) = (&predictor, &db);
        let results: Vec<f64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        predictor_ref
                            .predict(db_ref, &request())
                            .unwrap()
                            .predicted_runs
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|r| (r - 176.67).abs() < 1e-9));

        // The cache lock is free again and the snapshot can be dropped.
        predictor.invalidate_snapshot();
        assert!(predictor.snapshot.lock().unwrap().is_none());
    }

    #[test]
    fn zero_ttl_always_rebuilds() {
        let db = Database::open(":memory:").unwrap();
        let predictor = Predictor::with_model(loaded(Box::new(EchoRecentForm)), Duration::ZERO);
        // No history: fill mean.
        assert_eq!(predictor.predict(&db, &request()).unwrap().predicted_runs, 155.0);
        db.upsert_matches(&history()).unwrap();
        let out = predictor.predict(&db, &request()).unwrap().predicted_runs;
        assert!((out - 176.67).abs() < 1e-9);
    }
}
