// CSV ingestion of the raw IPL exports into the match record store.
//
// Raw rows are read as optional strings and coerced field by field: a value
// that fails to parse falls back to a neutral default and is logged, never
// failing the whole run. Only rows missing their identifying key are skipped.

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::db::Database;
use crate::records::{
    BallEvent, BattingCardEntry, BowlingCardEntry, MatchRecord, Player, TableCounts,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Rows written per table.
    pub loaded: TableCounts,
    /// Rows dropped because their key could not be read.
    pub skipped: TableCounts,
}

/// Rows from one file plus how many were dropped.
#[derive(Debug)]
struct Loaded<T> {
    rows: Vec<T>,
    skipped: usize,
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default, alias = "name")]
    player_name: Option<String>,
    #[serde(default)]
    batting_style: Option<String>,
    #[serde(default)]
    bowling_style: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(default)]
    match_id: Option<String>,
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    match_date: Option<String>,
    #[serde(default, alias = "venue_stadium")]
    match_venue_stadium: Option<String>,
    #[serde(default, alias = "venue_city")]
    match_venue_city: Option<String>,
    #[serde(default)]
    team1_name: Option<String>,
    #[serde(default)]
    team2_name: Option<String>,
    #[serde(default)]
    toss_winner: Option<String>,
    #[serde(default)]
    toss_winner_choice: Option<String>,
    #[serde(default)]
    match_winner: Option<String>,
    #[serde(default, alias = "result_margin")]
    match_result_text: Option<String>,
    #[serde(default, alias = "team1_score")]
    team1_runs_scored: Option<String>,
    #[serde(default, alias = "team2_score")]
    team2_runs_scored: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBattingCard {
    #[serde(default)]
    match_id: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default, alias = "player_id")]
    batsman_id: Option<String>,
    #[serde(default)]
    runs: Option<String>,
    #[serde(default)]
    balls: Option<String>,
    #[serde(default)]
    fours: Option<String>,
    #[serde(default)]
    sixes: Option<String>,
    #[serde(default, alias = "strike_rate")]
    strikerate: Option<String>,
    #[serde(default, alias = "is_out")]
    isout: Option<String>,
    #[serde(default, alias = "wicket_type")]
    wickettype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBowlingCard {
    #[serde(default)]
    match_id: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default, alias = "player_id")]
    bowler_id: Option<String>,
    #[serde(default)]
    overs: Option<String>,
    #[serde(default, alias = "runs_conceded")]
    conceded: Option<String>,
    #[serde(default)]
    wickets: Option<String>,
    #[serde(default)]
    economy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBall {
    #[serde(default)]
    match_id: Option<String>,
    #[serde(default)]
    innings_no: Option<String>,
    #[serde(default)]
    over_number: Option<String>,
    #[serde(default)]
    ball_number: Option<String>,
    #[serde(default)]
    batsman_id: Option<String>,
    #[serde(default)]
    bowler_id: Option<String>,
    #[serde(default)]
    total_runs: Option<String>,
    #[serde(default)]
    batsman_runs: Option<String>,
    #[serde(default, alias = "is_four")]
    isfour: Option<String>,
    #[serde(default, alias = "is_six")]
    issix: Option<String>,
    #[serde(default, alias = "is_wicket")]
    iswicket: Option<String>,
    #[serde(default)]
    dismissal_kind: Option<String>,
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

/// Trimmed, non-empty text. Treats the pandas-style `nan` marker as missing.
fn text(raw: &Option<String>) -> Option<String> {
    let s = raw.as_deref()?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s.to_string())
    }
}

fn text_or_empty(raw: &Option<String>) -> String {
    text(raw).unwrap_or_default()
}

/// Parse a number that may have been written as a float (`"12.0"`).
fn number(raw: &Option<String>) -> Option<f64> {
    text(raw)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Identifier column. `None` when absent or unparseable.
fn id(raw: &Option<String>) -> Option<i64> {
    number(raw).map(|v| v.trunc() as i64)
}

/// Non-negative count. Unparseable becomes 0, negatives clamp to 0.
fn count(column: &str, raw: &Option<String>) -> u32 {
    match number(raw) {
        Some(v) if v >= 0.0 => v.trunc() as u32,
        Some(v) => {
            debug!("clamping negative {column} value {v} to 0");
            0
        }
        None => {
            if raw.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                warn!("coercing unparseable {column} value {:?} to 0", raw);
            }
            0
        }
    }
}

/// Signed integer with a zero default (team totals).
fn integer(column: &str, raw: &Option<String>) -> i64 {
    match number(raw) {
        Some(v) => v.trunc() as i64,
        None => {
            if raw.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                warn!("coercing unparseable {column} value {:?} to 0", raw);
            }
            0
        }
    }
}

/// Non-negative real with a zero default.
fn real(column: &str, raw: &Option<String>) -> f64 {
    match number(raw) {
        Some(v) if v >= 0.0 => v,
        Some(_) => 0.0,
        None => {
            if raw.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                warn!("coercing unparseable {column} value {:?} to 0.0", raw);
            }
            0.0
        }
    }
}

/// `true` iff the trimmed value is "true" (any case) or "1".
fn flag(raw: &Option<String>) -> bool {
    raw.as_deref()
        .map(str::trim)
        .is_some_and(|s| s.eq_ignore_ascii_case("true") || s == "1")
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d", "%d/%m/%Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Calendar date in any of the formats seen in the raw exports.
fn date(raw: &Option<String>) -> Option<NaiveDate> {
    let s = text(raw)?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
                .map(|dt| dt.date())
        })
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Loaded<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<RawPlayer>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let (Some(player_id), Some(name)) = (id(&raw.player_id), text(&raw.player_name)) else {
            warn!("skipping player row without id or name: {:?}", raw.player_id);
            skipped += 1;
            continue;
        };
        rows.push(Player {
            player_id,
            name,
            batting_style: text(&raw.batting_style),
            bowling_style: text(&raw.bowling_style),
            image_url: text(&raw.image_url),
        });
    }
    Ok(Loaded { rows, skipped })
}

fn load_matches_from_reader<R: Read>(rdr: R) -> Result<Loaded<MatchRecord>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<RawMatch>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed match row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let Some(match_id) = id(&raw.match_id) else {
            warn!("skipping match row without a readable match_id: {:?}", raw.match_id);
            skipped += 1;
            continue;
        };

        let match_date = date(&raw.match_date);
        if match_date.is_none() {
            warn!(match_id, "unparseable match_date {:?}, storing NULL", raw.match_date);
        }
        let season = match id(&raw.season) {
            Some(s) => s as i32,
            None => {
                let fallback = match_date.map(|d| d.format("%Y").to_string());
                match fallback.and_then(|y| y.parse::<i32>().ok()) {
                    Some(year) => year,
                    None => {
                        warn!(match_id, "skipping match without a season or date");
                        skipped += 1;
                        continue;
                    }
                }
            }
        };

        rows.push(MatchRecord {
            match_id,
            season,
            match_date,
            venue_stadium: text_or_empty(&raw.match_venue_stadium),
            venue_city: text_or_empty(&raw.match_venue_city),
            team1_name: text_or_empty(&raw.team1_name),
            team2_name: text_or_empty(&raw.team2_name),
            toss_winner: text_or_empty(&raw.toss_winner),
            toss_winner_choice: text_or_empty(&raw.toss_winner_choice),
            match_winner: text(&raw.match_winner),
            result_margin: text(&raw.match_result_text),
            team1_score: integer("team1_runs_scored", &raw.team1_runs_scored),
            team2_score: integer("team2_runs_scored", &raw.team2_runs_scored),
        });
    }
    Ok(Loaded { rows, skipped })
}

fn load_batting_from_reader<R: Read>(rdr: R) -> Result<Loaded<BattingCardEntry>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<RawBattingCard>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed batting card row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let Some(match_id) = id(&raw.match_id) else {
            warn!("skipping batting card row without match_id");
            skipped += 1;
            continue;
        };
        rows.push(BattingCardEntry {
            match_id,
            team: text_or_empty(&raw.team),
            player_id: id(&raw.batsman_id).unwrap_or(0),
            runs: count("runs", &raw.runs),
            balls: count("balls", &raw.balls),
            fours: count("fours", &raw.fours),
            sixes: count("sixes", &raw.sixes),
            strike_rate: real("strikerate", &raw.strikerate),
            is_out: flag(&raw.isout),
            wicket_type: text(&raw.wickettype),
        });
    }
    Ok(Loaded { rows, skipped })
}

fn load_bowling_from_reader<R: Read>(rdr: R) -> Result<Loaded<BowlingCardEntry>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<RawBowlingCard>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed bowling card row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let Some(match_id) = id(&raw.match_id) else {
            warn!("skipping bowling card row without match_id");
            skipped += 1;
            continue;
        };
        rows.push(BowlingCardEntry {
            match_id,
            team: text_or_empty(&raw.team),
            player_id: id(&raw.bowler_id).unwrap_or(0),
            overs: real("overs", &raw.overs),
            runs_conceded: count("conceded", &raw.conceded),
            wickets: count("wickets", &raw.wickets),
            economy: real("economy", &raw.economy),
        });
    }
    Ok(Loaded { rows, skipped })
}

fn load_balls_from_reader<R: Read>(rdr: R) -> Result<Loaded<BallEvent>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<RawBall>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed delivery row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let Some(match_id) = id(&raw.match_id) else {
            skipped += 1;
            continue;
        };
        rows.push(BallEvent {
            match_id,
            innings_no: count("innings_no", &raw.innings_no),
            over_number: count("over_number", &raw.over_number),
            ball_number: count("ball_number", &raw.ball_number),
            batsman_id: id(&raw.batsman_id).unwrap_or(0),
            bowler_id: id(&raw.bowler_id).unwrap_or(0),
            total_runs: count("total_runs", &raw.total_runs),
            batsman_runs: count("batsman_runs", &raw.batsman_runs),
            is_four: flag(&raw.isfour),
            is_six: flag(&raw.issix),
            is_wicket: flag(&raw.iswicket),
            dismissal_kind: text(&raw.dismissal_kind),
        });
    }
    if skipped > 0 {
        warn!("skipped {skipped} delivery rows without a readable match_id");
    }
    Ok(Loaded { rows, skipped })
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, IngestError> {
    std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> IngestError + '_ {
    move |e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    }
}

/// Load the player directory CSV.
pub fn load_players(path: &Path) -> Result<Vec<Player>, IngestError> {
    Ok(load_players_from_reader(open(path)?).map_err(csv_err(path))?.rows)
}

/// Load the historical matches CSV.
pub fn load_matches(path: &Path) -> Result<Vec<MatchRecord>, IngestError> {
    Ok(load_matches_from_reader(open(path)?).map_err(csv_err(path))?.rows)
}

/// Load the batting scorecards CSV.
pub fn load_batting_cards(path: &Path) -> Result<Vec<BattingCardEntry>, IngestError> {
    Ok(load_batting_from_reader(open(path)?).map_err(csv_err(path))?.rows)
}

/// Load the bowling scorecards CSV.
pub fn load_bowling_cards(path: &Path) -> Result<Vec<BowlingCardEntry>, IngestError> {
    Ok(load_bowling_from_reader(open(path)?).map_err(csv_err(path))?.rows)
}

/// Load the ball-by-ball CSV.
pub fn load_balls(path: &Path) -> Result<Vec<BallEvent>, IngestError> {
    Ok(load_balls_from_reader(open(path)?).map_err(csv_err(path))?.rows)
}

/// Load every raw export named in `paths` and write it to the store.
///
/// Players and matches are upserted. Scorecards and deliveries are replaced
/// wholesale so repeated runs converge on the same contents.
pub fn ingest_all(db: &Database, paths: &DataConfig) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();

    let path = paths.players_path();
    info!("loading players from {}", path.display());
    let players = load_players_from_reader(open(&path)?).map_err(csv_err(&path))?;
    summary.loaded.players = db.upsert_players(&players.rows)?;
    summary.skipped.players = players.skipped;

    let path = paths.matches_path();
    info!("loading matches from {}", path.display());
    let matches = load_matches_from_reader(open(&path)?).map_err(csv_err(&path))?;
    summary.loaded.matches = db.upsert_matches(&matches.rows)?;
    summary.skipped.matches = matches.skipped;

    let path = paths.batting_cards_path();
    info!("loading batting cards from {}", path.display());
    let batting = load_batting_from_reader(open(&path)?).map_err(csv_err(&path))?;

    let path = paths.bowling_cards_path();
    info!("loading bowling cards from {}", path.display());
    let bowling = load_bowling_from_reader(open(&path)?).map_err(csv_err(&path))?;

    let path = paths.ball_by_ball_path();
    info!("loading ball-by-ball data from {}", path.display());
    let balls = load_balls_from_reader(open(&path)?).map_err(csv_err(&path))?;

    db.replace_scorecards(&batting.rows, &bowling.rows, &balls.rows)?;
    summary.loaded.batting_cards = batting.rows.len();
    summary.skipped.batting_cards = batting.skipped;
    summary.loaded.bowling_cards = bowling.rows.len();
    summary.skipped.bowling_cards = bowling.skipped;
    summary.loaded.ball_by_ball = balls.rows.len();
    summary.skipped.ball_by_ball = balls.skipped;

    info!(
        players = summary.loaded.players,
        matches = summary.loaded.matches,
        batting_cards = summary.loaded.batting_cards,
        bowling_cards = summary.loaded.bowling_cards,
        ball_by_ball = summary.loaded.ball_by_ball,
        "ingestion complete"
    );

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
