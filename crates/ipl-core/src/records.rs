// Row types for the normalized match record store.
//
// These mirror the store schema one-to-one. They are produced by the CSV
// ingestion layer and read back by the analytics crate; nothing downstream
// mutates them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A registered player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: i64,
    pub name: String,
    pub batting_style: Option<String>,
    pub bowling_style: Option<String>,
    pub image_url: Option<String>,
}

/// One match as recorded after it was played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: i64,
    pub season: i32,
    /// `None` when the raw date could not be parsed.
    pub match_date: Option<NaiveDate>,
    pub venue_stadium: String,
    pub venue_city: String,
    pub team1_name: String,
    pub team2_name: String,
    pub toss_winner: String,
    pub toss_winner_choice: String,
    pub match_winner: Option<String>,
    pub result_margin: Option<String>,
    pub team1_score: i64,
    pub team2_score: i64,
}

impl MatchRecord {
    /// A match counts as completed only when both sides posted a score.
    /// Abandoned or no-result fixtures carry a zero for at least one side.
    pub fn is_completed(&self) -> bool {
        self.team1_score > 0 && self.team2_score > 0
    }
}

/// One batting appearance: a single player in a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattingCardEntry {
    pub match_id: i64,
    pub team: String,
    pub player_id: i64,
    pub runs: u32,
    pub balls: u32,
    pub fours: u32,
    pub sixes: u32,
    pub strike_rate: f64,
    /// `false` means the batter finished not out.
    pub is_out: bool,
    pub wicket_type: Option<String>,
}

/// One bowling spell: a single player in a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BowlingCardEntry {
    pub match_id: i64,
    pub team: String,
    pub player_id: i64,
    /// Cricket notation: `3.4` is three overs and four balls.
    pub overs: f64,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub economy: f64,
}

/// A single delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallEvent {
    pub match_id: i64,
    pub innings_no: u32,
    pub over_number: u32,
    pub ball_number: u32,
    pub batsman_id: i64,
    pub bowler_id: i64,
    pub total_runs: u32,
    pub batsman_runs: u32,
    pub is_four: bool,
    pub is_six: bool,
    pub is_wicket: bool,
    pub dismissal_kind: Option<String>,
}

/// Row counts per table, used for ingest summaries and health checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub players: usize,
    pub matches: usize,
    pub batting_cards: usize,
    pub bowling_cards: usize,
    pub ball_by_ball: usize,
}
