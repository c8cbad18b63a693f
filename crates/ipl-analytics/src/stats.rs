// Career figures aggregated from batting and bowling scorecards.

use anyhow::Result;
use ipl_core::db::Database;
use ipl_core::records::{BattingCardEntry, BowlingCardEntry};
use serde::Serialize;
use tracing::debug;

/// Round to two decimal places. Applied only when building a report.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Batting
// ---------------------------------------------------------------------------

/// Career batting record for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub matches: u32,
    pub runs: u64,
    pub balls: u64,
    #[serde(rename = "avg")]
    pub average: f64,
    pub strike_rate: f64,
    pub hundreds: u32,
    pub fifties: u32,
}

/// Unrounded running totals over a player's batting entries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BattingTotals {
    pub matches: u32,
    pub runs: u64,
    pub balls: u64,
    pub outs: u32,
    pub hundreds: u32,
    pub fifties: u32,
}

impl BattingTotals {
    pub fn add(&mut self, entry: &BattingCardEntry) {
        self.matches += 1;
        self.runs += u64::from(entry.runs);
        self.balls += u64::from(entry.balls);
        if entry.is_out {
            self.outs += 1;
        }
        // Disjoint: a century is never also a half-century.
        if entry.runs >= 100 {
            self.hundreds += 1;
        } else if entry.runs >= 50 {
            self.fifties += 1;
        }
    }

    /// Runs per dismissal. A player never dismissed reports total runs.
    pub fn average(&self) -> f64 {
        if self.outs > 0 {
            self.runs as f64 / f64::from(self.outs)
        } else {
            self.runs as f64
        }
    }

    /// Runs per 100 balls, or 0.0 when no balls were faced.
    pub fn strike_rate(&self) -> f64 {
        if self.balls > 0 {
            self.runs as f64 / self.balls as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn report(&self) -> PlayerStats {
        PlayerStats {
            matches: self.matches,
            runs: self.runs,
            balls: self.balls,
            average: round2(self.average()),
            strike_rate: round2(self.strike_rate()),
            hundreds: self.hundreds,
            fifties: self.fifties,
        }
    }
}

/// Aggregate a player's batting entries into a report.
pub fn aggregate_batting(entries: &[BattingCardEntry]) -> PlayerStats {
    let mut totals = BattingTotals::default();
    for entry in entries {
        totals.add(entry);
    }
    totals.report()
}

/// Career batting figures for `player_id`. An unknown player yields the
/// all-zero record.
pub fn get_player_stats(db: &Database, player_id: i64) -> Result<PlayerStats> {
    let entries = db.batting_entries_for_player(player_id)?;
    debug!(player_id, entries = entries.len(), "aggregating batting stats");
    Ok(aggregate_batting(&entries))
}

// ---------------------------------------------------------------------------
// Bowling
// ---------------------------------------------------------------------------

/// Career bowling record for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BowlerStats {
    pub matches: u32,
    pub balls: u64,
    pub runs_conceded: u64,
    pub wickets: u32,
    pub economy: f64,
    pub average: f64,
    pub strike_rate: f64,
}

/// Convert cricket overs notation into balls: `3.4` is 3 overs and 4 balls.
pub fn overs_to_balls(overs: f64) -> u64 {
    if !overs.is_finite() || overs <= 0.0 {
        return 0;
    }
    let whole = overs.trunc();
    let part = ((overs - whole) * 10.0).round();
    whole as u64 * 6 + part as u64
}

pub fn aggregate_bowling(entries: &[BowlingCardEntry]) -> BowlerStats {
    let mut matches = 0u32;
    let mut balls = 0u64;
    let mut runs = 0u64;
    let mut wickets = 0u32;
    for entry in entries {
        matches += 1;
        balls += overs_to_balls(entry.overs);
        runs += u64::from(entry.runs_conceded);
        wickets += entry.wickets;
    }

    let economy = if balls > 0 {
        runs as f64 * 6.0 / balls as f64
    } else {
        0.0
    };
    let (average, strike_rate) = if wickets > 0 {
        (
            runs as f64 / f64::from(wickets),
            balls as f64 / f64::from(wickets),
        )
    } else {
        (runs as f64, 0.0)
    };

    BowlerStats {
        matches,
        balls,
        runs_conceded: runs,
        wickets,
        economy: round2(economy),
        average: round2(average),
        strike_rate: round2(strike_rate),
    }
}

/// Career bowling figures for `player_id`. An unknown player yields the
/// all-zero record.
pub fn get_bowler_stats(db: &Database, player_id: i64) -> Result<BowlerStats> {
    let entries = db.bowling_entries_for_player(player_id)?;
    debug!(player_id, entries = entries.len(), "aggregating bowling stats");
    Ok(aggregate_bowling(&entries))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
