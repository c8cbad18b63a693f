// Configuration loading and parsing (config/ipl.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "ipl.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub data: DataConfig,
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub serving: ServingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Locations of the raw CSV exports, relative to `raw_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub raw_dir: String,
    #[serde(default = "default_players_file")]
    pub players: String,
    #[serde(default = "default_matches_file")]
    pub matches: String,
    #[serde(default = "default_batting_file")]
    pub batting_cards: String,
    #[serde(default = "default_bowling_file")]
    pub bowling_cards: String,
    #[serde(default = "default_balls_file")]
    pub ball_by_ball: String,
}

impl DataConfig {
    pub fn players_path(&self) -> PathBuf {
        Path::new(&self.raw_dir).join(&self.players)
    }

    pub fn matches_path(&self) -> PathBuf {
        Path::new(&self.raw_dir).join(&self.matches)
    }

    pub fn batting_cards_path(&self) -> PathBuf {
        Path::new(&self.raw_dir).join(&self.batting_cards)
    }

    pub fn bowling_cards_path(&self) -> PathBuf {
        Path::new(&self.raw_dir).join(&self.bowling_cards)
    }

    pub fn ball_by_ball_path(&self) -> PathBuf {
        Path::new(&self.raw_dir).join(&self.ball_by_ball)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    /// Number of prior innings in the "recent form" window.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Seasons at or after this year form the held-out test split.
    #[serde(default = "default_test_season_start")]
    pub test_season_start: i32,
    /// Ridge penalty on standardized coefficients.
    #[serde(default = "default_l2")]
    pub l2: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_season_start: default_test_season_start(),
            l2: default_l2(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the log file. Logs go to stderr when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_players_file() -> String {
    "ipl_players_info.csv".into()
}

fn default_matches_file() -> String {
    "ipl_historical.csv".into()
}

fn default_batting_file() -> String {
    "ipl_batting_card.csv".into()
}

fn default_bowling_file() -> String {
    "ipl_bowling_card.csv".into()
}

fn default_balls_file() -> String {
    "ipl_ball_by_ball_data.csv".into()
}

fn default_recent_window() -> usize {
    5
}

fn default_test_season_start() -> i32 {
    2022
}

fn default_l2() -> f64 {
    1.0
}

fn default_snapshot_ttl_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/ipl.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` handles that.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Directory the CLI treats as its project root.
///
/// The current directory wins when it holds `config/` or `defaults/`;
/// otherwise the per-user config directory is used.
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if cwd.join("config").exists() || cwd.join("defaults").exists() {
        return Ok(cwd);
    }
    match directories::ProjectDirs::from("", "", "ipl") {
        Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
        None => Ok(cwd),
    }
}

/// Convenience wrapper: copies defaults if needed, then loads from
/// `base_dir()`.
pub fn load_config() -> Result<Config, ConfigError> {
    let base = base_dir()?;
    ensure_config_files(&base)?;
    load_config_from(&base)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.features.recent_window == 0 {
        return Err(ConfigError::ValidationError {
            field: "features.recent_window".into(),
            message: "must be greater than 0".into(),
        });
    }

    let l2 = config.training.l2;
    if !l2.is_finite() || l2 < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "training.l2".into(),
            message: format!("must be a finite value >= 0, got {l2}"),
        });
    }

    let season = config.training.test_season_start;
    if !(1000..=9999).contains(&season) {
        return Err(ConfigError::ValidationError {
            field: "training.test_season_start".into(),
            message: format!("must be a four-digit year, got {season}"),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
