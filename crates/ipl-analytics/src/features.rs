// Innings-level training frame with point-in-time rolling features.
//
// Every rolling value attached to an innings is read from the per-key state
// *before* any innings of the same match is pushed into it, so no record can
// see its own runs, its sibling innings, or anything later in the order.

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use chrono::NaiveDate;
use ipl_core::db::Database;
use ipl_core::records::MatchRecord;
use serde::Serialize;
use tracing::{debug, info};

/// Model input columns, in the order the regressor is trained on.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "season",
    "venue",
    "team",
    "opposition",
    "toss_winner",
    "toss_choice",
    "innings",
    "team_avg_runs_5",
    "team_avg_runs_all",
    "venue_avg_runs",
];

pub const FEATURE_COUNT: usize = 10;

/// Target column kept alongside the features.
pub const TARGET_COLUMN: &str = "runs";

/// A single model input row.
pub type FeatureVector = [f64; FEATURE_COUNT];

// ---------------------------------------------------------------------------
// Innings records
// ---------------------------------------------------------------------------

/// One team's innings within one completed match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InningsRecord {
    pub match_id: i64,
    pub season: i32,
    pub match_date: NaiveDate,
    pub venue: String,
    pub team: String,
    pub opposition: String,
    pub toss_winner: String,
    pub toss_choice: String,
    /// 1 for the side batting first, 2 for the chase.
    pub innings: u8,
    pub runs: i64,
}

/// Expand completed, dated matches into two innings each, ordered by
/// `(date, match id, innings)`.
pub fn expand_innings(matches: &[MatchRecord]) -> Vec<InningsRecord> {
    let mut records = Vec::with_capacity(matches.len() * 2);
    for m in matches {
        let Some(match_date) = m.match_date else {
            continue;
        };
        if !m.is_completed() {
            continue;
        }
        let sides = [
            (1u8, &m.team1_name, &m.team2_name, m.team1_score),
            (2u8, &m.team2_name, &m.team1_name, m.team2_score),
        ];
        for (innings, team, opposition, runs) in sides {
            records.push(InningsRecord {
                match_id: m.match_id,
                season: m.season,
                match_date,
                venue: m.venue_stadium.clone(),
                team: team.clone(),
                opposition: opposition.clone(),
                toss_winner: m.toss_winner.clone(),
                toss_choice: m.toss_winner_choice.clone(),
                innings,
                runs,
            });
        }
    }
    records.sort_by(|a, b| {
        (a.match_date, a.match_id, a.innings).cmp(&(b.match_date, b.match_id, b.innings))
    });
    records
}

// ---------------------------------------------------------------------------
// Rolling state
// ---------------------------------------------------------------------------

/// Running history of one grouping key (a team or a venue).
#[derive(Debug, Clone)]
pub struct RollingState {
    window: usize,
    recent: VecDeque<f64>,
    total: f64,
    count: usize,
}

impl RollingState {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            recent: VecDeque::with_capacity(window.max(1)),
            total: 0.0,
            count: 0,
        }
    }

    pub fn push(&mut self, runs: f64) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(runs);
        self.total += runs;
        self.count += 1;
    }

    /// Mean of the last `window` values seen, or `None` before the first.
    pub fn recent_mean(&self) -> Option<f64> {
        (!self.recent.is_empty())
            .then(|| self.recent.iter().sum::<f64>() / self.recent.len() as f64)
    }

    /// Mean of every value seen, or `None` before the first.
    pub fn overall_mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Rolling state for every team and venue, advanced one match at a time.
#[derive(Debug, Clone)]
pub struct RollingIndex {
    window: usize,
    teams: HashMap<String, RollingState>,
    venues: HashMap<String, RollingState>,
}

/// Rolling features for one innings. `None` means the key had no history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingValues {
    pub team_avg_runs_5: Option<f64>,
    pub team_avg_runs_all: Option<f64>,
    pub venue_avg_runs: Option<f64>,
}

impl RollingIndex {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            teams: HashMap::new(),
            venues: HashMap::new(),
        }
    }

    /// Feature values for `team` at `venue` given everything observed so far.
    pub fn lookup(&self, team: &str, venue: &str) -> RollingValues {
        let team_state = self.teams.get(team);
        RollingValues {
            team_avg_runs_5: team_state.and_then(RollingState::recent_mean),
            team_avg_runs_all: team_state.and_then(RollingState::overall_mean),
            venue_avg_runs: self.venues.get(venue).and_then(RollingState::overall_mean),
        }
    }

    /// Record the runs of one innings.
    pub fn observe(&mut self, record: &InningsRecord) {
        let runs = record.runs as f64;
        let window = self.window;
        self.teams
            .entry(record.team.clone())
            .or_insert_with(|| RollingState::new(window))
            .push(runs);
        self.venues
            .entry(record.venue.clone())
            .or_insert_with(|| RollingState::new(window))
            .push(runs);
    }

    /// Number of innings seen for `team`.
    pub fn team_count(&self, team: &str) -> usize {
        self.teams.get(team).map_or(0, RollingState::count)
    }
}

/// Walk `records` (already in chronological order) one match at a time,
/// yielding each record with the features visible strictly before its match.
fn walk_matches<'a, F>(records: &'a [InningsRecord], index: &mut RollingIndex, mut emit: F)
where
    F: FnMut(&'a InningsRecord, RollingValues),
{
    let mut start = 0;
    while start < records.len() {
        let match_id = records[start].match_id;
        let end = records[start..]
            .iter()
            .position(|r| r.match_id != match_id)
            .map_or(records.len(), |offset| start + offset);
        let group = &records[start..end];

        for record in group {
            emit(record, index.lookup(&record.team, &record.venue));
        }
        for record in group {
            index.observe(record);
        }
        start = end;
    }
}

// ---------------------------------------------------------------------------
// Training frame
// ---------------------------------------------------------------------------

/// An innings with its rolling features filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub record: InningsRecord,
    pub team_avg_runs_5: f64,
    pub team_avg_runs_all: f64,
    pub venue_avg_runs: f64,
}

impl FeatureRow {
    pub fn target(&self) -> f64 {
        self.record.runs as f64
    }
}

/// Chronologically ordered feature rows plus the fill value used for
/// entities without history.
#[derive(Debug, Clone, Default)]
pub struct TrainingFrame {
    pub rows: Vec<FeatureRow>,
    /// Mean runs over every innings in the frame.
    pub global_mean: f64,
    pub recent_window: usize,
}

/// Build the training frame from match records in memory.
pub fn build_training_frame_from(matches: &[MatchRecord], recent_window: usize) -> TrainingFrame {
    let records = expand_innings(matches);
    let global_mean = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.runs as f64).sum::<f64>() / records.len() as f64
    };

    let mut index = RollingIndex::new(recent_window);
    let mut rows = Vec::with_capacity(records.len());
    walk_matches(&records, &mut index, |record, values| {
        rows.push(FeatureRow {
            record: record.clone(),
            team_avg_runs_5: values.team_avg_runs_5.unwrap_or(global_mean),
            team_avg_runs_all: values.team_avg_runs_all.unwrap_or(global_mean),
            venue_avg_runs: values.venue_avg_runs.unwrap_or(global_mean),
        });
    });

    debug!(rows = rows.len(), global_mean, "built training frame");
    TrainingFrame {
        rows,
        global_mean,
        recent_window,
    }
}

/// Build the training frame from the completed matches in the store.
pub fn build_training_frame(db: &Database, recent_window: usize) -> Result<TrainingFrame> {
    let matches = db.load_completed_matches()?;
    info!(matches = matches.len(), "loaded completed matches");
    Ok(build_training_frame_from(&matches, recent_window))
}

// ---------------------------------------------------------------------------
// Serving snapshot
// ---------------------------------------------------------------------------

/// Latest rolling state per team and venue after replaying all history.
#[derive(Debug, Clone)]
pub struct RollingSnapshot {
    index: RollingIndex,
    innings_seen: usize,
}

impl RollingSnapshot {
    /// Replay `matches` through the same state machine used for training.
    pub fn from_matches(matches: &[MatchRecord], recent_window: usize) -> Self {
        let records = expand_innings(matches);
        let mut index = RollingIndex::new(recent_window);
        walk_matches(&records, &mut index, |_, _| {});
        Self {
            index,
            innings_seen: records.len(),
        }
    }

    pub fn from_store(db: &Database, recent_window: usize) -> Result<Self> {
        let matches = db.load_completed_matches()?;
        Ok(Self::from_matches(&matches, recent_window))
    }

    /// Features for the next innings of `team` at `venue`, falling back to
    /// `fill` for entities never observed.
    pub fn features_for(&self, team: &str, venue: &str, fill: f64) -> [f64; 3] {
        let values = self.index.lookup(team, venue);
        [
            values.team_avg_runs_5.unwrap_or(fill),
            values.team_avg_runs_all.unwrap_or(fill),
            values.venue_avg_runs.unwrap_or(fill),
        ]
    }

    pub fn innings_seen(&self) -> usize {
        self.innings_seen
    }

    pub fn team_count(&self, team: &str) -> usize {
        self.index.team_count(team)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
