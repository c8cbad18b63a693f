// SQLite-backed normalized match record store.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

use crate::records::{
    BallEvent, BattingCardEntry, BowlingCardEntry, MatchRecord, Player, TableCounts,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Read-mostly store of matches, players, scorecards and deliveries.
///
/// Writers are the ingestion layer only; everything in the analytics crate
/// reads a stable snapshot through the query methods below.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = OFF;",
        )
        .context("failed to set database pragmas")?;

        // Scorecard rows in the raw data reference players missing from the
        // players file (and unparseable ids land as 0), so the references
        // are declared but foreign key enforcement stays off.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS matches (
                match_id           INTEGER PRIMARY KEY,
                season             INTEGER NOT NULL,
                match_date         TEXT,
                venue_stadium      TEXT NOT NULL,
                venue_city         TEXT NOT NULL,
                team1_name         TEXT NOT NULL,
                team2_name         TEXT NOT NULL,
                toss_winner        TEXT NOT NULL,
                toss_winner_choice TEXT NOT NULL,
                match_winner       TEXT,
                result_margin      TEXT,
                team1_score        INTEGER NOT NULL,
                team2_score        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS players (
                player_id     INTEGER PRIMARY KEY,
                name          TEXT NOT NULL,
                batting_style TEXT,
                bowling_style TEXT,
                image_url     TEXT
            );

            CREATE TABLE IF NOT EXISTS batting_cards (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id    INTEGER NOT NULL REFERENCES matches(match_id),
                team        TEXT NOT NULL,
                player_id   INTEGER NOT NULL REFERENCES players(player_id),
                runs        INTEGER NOT NULL,
                balls       INTEGER NOT NULL,
                fours       INTEGER NOT NULL,
                sixes       INTEGER NOT NULL,
                strike_rate REAL NOT NULL,
                is_out      INTEGER NOT NULL,
                wicket_type TEXT
            );

            CREATE TABLE IF NOT EXISTS bowling_cards (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id      INTEGER NOT NULL REFERENCES matches(match_id),
                team          TEXT NOT NULL,
                player_id     INTEGER NOT NULL REFERENCES players(player_id),
                overs         REAL NOT NULL,
                runs_conceded INTEGER NOT NULL,
                wickets       INTEGER NOT NULL,
                economy       REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ball_by_ball (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id       INTEGER NOT NULL REFERENCES matches(match_id),
                innings_no     INTEGER NOT NULL,
                over_number    INTEGER NOT NULL,
                ball_number    INTEGER NOT NULL,
                batsman_id     INTEGER NOT NULL REFERENCES players(player_id),
                bowler_id      INTEGER NOT NULL REFERENCES players(player_id),
                total_runs     INTEGER NOT NULL,
                batsman_runs   INTEGER NOT NULL,
                is_four        INTEGER NOT NULL,
                is_six         INTEGER NOT NULL,
                is_wicket      INTEGER NOT NULL,
                dismissal_kind TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date, match_id);
            CREATE INDEX IF NOT EXISTS idx_batting_player ON batting_cards(player_id);
            CREATE INDEX IF NOT EXISTS idx_bowling_player ON bowling_cards(player_id);
            CREATE INDEX IF NOT EXISTS idx_balls_match ON ball_by_ball(match_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection for the duration of one request. The guard
    /// releases it on every exit path, including early `?` returns.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Writes (ingestion)
    // ------------------------------------------------------------------

    /// Insert players, replacing any existing row with the same id.
    pub fn upsert_players(&self, players: &[Player]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin players transaction")?;
        for p in players {
            tx.execute(
                "INSERT INTO players (player_id, name, batting_style, bowling_style, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(player_id) DO UPDATE SET
                    name          = excluded.name,
                    batting_style = excluded.batting_style,
                    bowling_style = excluded.bowling_style,
                    image_url     = excluded.image_url",
                params![
                    p.player_id,
                    p.name,
                    p.batting_style,
                    p.bowling_style,
                    p.image_url
                ],
            )
            .context("failed to upsert player")?;
        }
        tx.commit().context("failed to commit players")?;
        Ok(players.len())
    }

    /// Insert matches, replacing any existing row with the same id.
    pub fn upsert_matches(&self, matches: &[MatchRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin matches transaction")?;
        for m in matches {
            tx.execute(
                "INSERT INTO matches (
                    match_id, season, match_date, venue_stadium, venue_city,
                    team1_name, team2_name, toss_winner, toss_winner_choice,
                    match_winner, result_margin, team1_score, team2_score
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(match_id) DO UPDATE SET
                    season             = excluded.season,
                    match_date         = excluded.match_date,
                    venue_stadium      = excluded.venue_stadium,
                    venue_city         = excluded.venue_city,
                    team1_name         = excluded.team1_name,
                    team2_name         = excluded.team2_name,
                    toss_winner        = excluded.toss_winner,
                    toss_winner_choice = excluded.toss_winner_choice,
                    match_winner       = excluded.match_winner,
                    result_margin      = excluded.result_margin,
                    team1_score        = excluded.team1_score,
                    team2_score        = excluded.team2_score",
                params![
                    m.match_id,
                    m.season,
                    m.match_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    m.venue_stadium,
                    m.venue_city,
                    m.team1_name,
                    m.team2_name,
                    m.toss_winner,
                    m.toss_winner_choice,
                    m.match_winner,
                    m.result_margin,
                    m.team1_score,
                    m.team2_score,
                ],
            )
            .context("failed to upsert match")?;
        }
        tx.commit().context("failed to commit matches")?;
        Ok(matches.len())
    }

    /// Replace every scorecard and delivery row in one transaction so a
    /// re-ingest does not double count and a failed insert leaves the
    /// previous load intact. Players and matches are upserted elsewhere.
    pub fn replace_scorecards(
        &self,
        batting: &[BattingCardEntry],
        bowling: &[BowlingCardEntry],
        balls: &[BallEvent],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin scorecard reload transaction")?;
        tx.execute_batch(
            "DELETE FROM batting_cards;
             DELETE FROM bowling_cards;
             DELETE FROM ball_by_ball;",
        )
        .context("failed to clear scorecard tables")?;
        write_batting_cards(&tx, batting)?;
        write_bowling_cards(&tx, bowling)?;
        write_balls(&tx, balls)?;
        tx.commit().context("failed to commit scorecard reload")?;
        Ok(())
    }

    /// Append batting card rows in a single transaction.
    pub fn insert_batting_cards(&self, entries: &[BattingCardEntry]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin batting cards transaction")?;
        write_batting_cards(&tx, entries)?;
        tx.commit().context("failed to commit batting cards")?;
        Ok(entries.len())
    }

    /// Append bowling card rows in a single transaction.
    pub fn insert_bowling_cards(&self, entries: &[BowlingCardEntry]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin bowling cards transaction")?;
        write_bowling_cards(&tx, entries)?;
        tx.commit().context("failed to commit bowling cards")?;
        Ok(entries.len())
    }

    /// Append deliveries in a single transaction.
    pub fn insert_balls(&self, balls: &[BallEvent]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin ball_by_ball transaction")?;
        write_balls(&tx, balls)?;
        tx.commit().context("failed to commit deliveries")?;
        Ok(balls.len())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Completed matches (both scores > 0, date known) in chronological
    /// order, ties on date broken by match id.
    pub fn load_completed_matches(&self) -> Result<Vec<MatchRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT match_id, season, match_date, venue_stadium, venue_city,
                        team1_name, team2_name, toss_winner, toss_winner_choice,
                        match_winner, result_margin, team1_score, team2_score
                 FROM matches
                 WHERE team1_score > 0 AND team2_score > 0 AND match_date IS NOT NULL
                 ORDER BY match_date ASC, match_id ASC",
            )
            .context("failed to prepare completed matches query")?;

        let matches = stmt
            .query_map([], match_from_row)
            .context("failed to query completed matches")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map match rows")?;

        Ok(matches)
    }

    /// All batting appearances for one player, ordered by match id.
    pub fn batting_entries_for_player(&self, player_id: i64) -> Result<Vec<BattingCardEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT match_id, team, player_id, runs, balls, fours, sixes, strike_rate, is_out, wicket_type
                 FROM batting_cards WHERE player_id = ?1 ORDER BY match_id, id",
            )
            .context("failed to prepare batting entries query")?;

        let entries = stmt
            .query_map(params![player_id], |row| {
                Ok(BattingCardEntry {
                    match_id: row.get(0)?,
                    team: row.get(1)?,
                    player_id: row.get(2)?,
                    runs: row.get(3)?,
                    balls: row.get(4)?,
                    fours: row.get(5)?,
                    sixes: row.get(6)?,
                    strike_rate: row.get(7)?,
                    is_out: row.get(8)?,
                    wicket_type: row.get(9)?,
                })
            })
            .context("failed to query batting entries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map batting rows")?;

        Ok(entries)
    }

    /// All bowling spells for one player, ordered by match id.
    pub fn bowling_entries_for_player(&self, player_id: i64) -> Result<Vec<BowlingCardEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT match_id, team, player_id, overs, runs_conceded, wickets, economy
                 FROM bowling_cards WHERE player_id = ?1 ORDER BY match_id, id",
            )
            .context("failed to prepare bowling entries query")?;

        let entries = stmt
            .query_map(params![player_id], |row| {
                Ok(BowlingCardEntry {
                    match_id: row.get(0)?,
                    team: row.get(1)?,
                    player_id: row.get(2)?,
                    overs: row.get(3)?,
                    runs_conceded: row.get(4)?,
                    wickets: row.get(5)?,
                    economy: row.get(6)?,
                })
            })
            .context("failed to query bowling entries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map bowling rows")?;

        Ok(entries)
    }

    /// Page through the player directory. `search` is a case-insensitive
    /// substring match on the player name.
    pub fn list_players(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Player>> {
        let conn = self.conn();
        let pattern = match search.map(str::trim) {
            Some(s) if !s.is_empty() => format!("%{}%", s.to_lowercase()),
            _ => "%".to_string(),
        };
        let mut stmt = conn
            .prepare(
                "SELECT player_id, name, batting_style, bowling_style, image_url
                 FROM players
                 WHERE lower(name) LIKE ?1
                 ORDER BY player_id
                 LIMIT ?2 OFFSET ?3",
            )
            .context("failed to prepare list_players query")?;

        let players = stmt
            .query_map(
                params![pattern, limit as i64, offset as i64],
                player_from_row,
            )
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;

        Ok(players)
    }

    /// Look up a single player. Returns `None` for an unknown id.
    pub fn get_player(&self, player_id: i64) -> Result<Option<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT player_id, name, batting_style, bowling_style, image_url
                 FROM players WHERE player_id = ?1",
            )
            .context("failed to prepare get_player query")?;

        let mut rows = stmt
            .query_map(params![player_id], player_from_row)
            .context("failed to query player")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to read player row")?)),
            None => Ok(None),
        }
    }

    /// Number of rows in each table.
    pub fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.conn();
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .with_context(|| format!("failed to count {table}"))?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            players: count("players")?,
            matches: count("matches")?,
            batting_cards: count("batting_cards")?,
            bowling_cards: count("bowling_cards")?,
            ball_by_ball: count("ball_by_ball")?,
        })
    }
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    let raw_date: Option<String> = row.get(2)?;
    Ok(MatchRecord {
        match_id: row.get(0)?,
        season: row.get(1)?,
        match_date: raw_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        venue_stadium: row.get(3)?,
        venue_city: row.get(4)?,
        team1_name: row.get(5)?,
        team2_name: row.get(6)?,
        toss_winner: row.get(7)?,
        toss_winner_choice: row.get(8)?,
        match_winner: row.get(9)?,
        result_margin: row.get(10)?,
        team1_score: row.get(11)?,
        team2_score: row.get(12)?,
    })
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        player_id: row.get(0)?,
        name: row.get(1)?,
        batting_style: row.get(2)?,
        bowling_style: row.get(3)?,
        image_url: row.get(4)?,
    })
}

// Row writers shared by the single-table inserts and the full reload. The
// caller owns the transaction.

fn write_batting_cards(conn: &Connection, entries: &[BattingCardEntry]) -> Result<()> {
    for e in entries {
        conn.execute(
            "INSERT INTO batting_cards
                (match_id, team, player_id, runs, balls, fours, sixes, strike_rate, is_out, wicket_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                e.match_id,
                e.team,
                e.player_id,
                e.runs,
                e.balls,
                e.fours,
                e.sixes,
                e.strike_rate,
                e.is_out,
                e.wicket_type,
            ],
        )
        .context("failed to insert batting card")?;
    }
    Ok(())
}

fn write_bowling_cards(conn: &Connection, entries: &[BowlingCardEntry]) -> Result<()> {
    for e in entries {
        conn.execute(
            "INSERT INTO bowling_cards
                (match_id, team, player_id, overs, runs_conceded, wickets, economy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                e.match_id,
                e.team,
                e.player_id,
                e.overs,
                e.runs_conceded,
                e.wickets,
                e.economy,
            ],
        )
        .context("failed to insert bowling card")?;
    }
    Ok(())
}

fn write_balls(conn: &Connection, balls: &[BallEvent]) -> Result<()> {
    for b in balls {
        conn.execute(
            "INSERT INTO ball_by_ball
                (match_id, innings_no, over_number, ball_number, batsman_id, bowler_id,
                 total_runs, batsman_runs, is_four, is_six, is_wicket, dismissal_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                b.match_id,
                b.innings_no,
                b.over_number,
                b.ball_number,
                b.batsman_id,
                b.bowler_id,
                b.total_runs,
                b.batsman_runs,
                b.is_four,
                b.is_six,
                b.is_wicket,
                b.dismissal_kind,
            ],
        )
        .context("failed to insert delivery")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn sample_match(match_id: i64, date: Option<&str>, scores: (i64, i64)) -> MatchRecord {
        MatchRecord {
            match_id,
            season: 2023,
            match_date: date.map(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).unwrap()),
            venue_stadium: "Wankhede Stadium".into(),
            venue_city: "Mumbai".into(),
            team1_name: "Mumbai Indians".into(),
            team2_name: "Chennai Super Kings".into(),
            toss_winner: "Mumbai Indians".into(),
            toss_winner_choice: "bat".into(),
            match_winner: Some("Mumbai Indians".into()),
            result_margin: None,
            team1_score: scores.0,
            team2_score: scores.1,
        }
    }

    fn sample_player(player_id: i64, name: &str) -> Player {
        Player {
            player_id,
            name: name.into(),
            batting_style: Some("Right-hand bat".into()),
            bowling_style: None,
            image_url: None,
        }
    }

    fn sample_batting(match_id: i64, player_id: i64, runs: u32, is_out: bool) -> BattingCardEntry {
        BattingCardEntry {
            match_id,
            team: "Mumbai Indians".into(),
            player_id,
            runs,
            balls: runs,
            fours: 0,
            sixes: 0,
            strike_rate: 100.0,
            is_out,
            wicket_type: is_out.then(|| "caught".to_string()),
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in ["matches", "players", "batting_cards", "bowling_cards", "ball_by_ball"] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    #[test]
    fn completed_matches_are_filtered_and_ordered() {
        let db = test_db();
        db.upsert_matches(&[
            sample_match(3, Some("2023-04-02"), (180, 170)),
            sample_match(2, Some("2023-04-01"), (150, 151)),
            sample_match(1, Some("2023-04-01"), (160, 140)),
            sample_match(4, Some("2023-04-03"), (0, 120)),
            sample_match(5, None, (160, 140)),
        ])
        .unwrap();

        let ids: Vec<i64> = db
            .load_completed_matches()
            .unwrap()
            .iter()
            .map(|m| m.match_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn upsert_match_replaces_existing_row() {
        let db = test_db();
        db.upsert_matches(&[sample_match(1, Some("2023-04-01"), (0, 0))])
            .unwrap();
        db.upsert_matches(&[sample_match(1, Some("2023-04-01"), (200, 190))])
            .unwrap();

        let matches = db.load_completed_matches().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].team1_score, 200);
        assert_eq!(db.table_counts().unwrap().matches, 1);
    }

    #[test]
    fn match_date_round_trips() {
        let db = test_db();
        db.upsert_matches(&[sample_match(7, Some("2019-05-12"), (149, 148))])
            .unwrap();
        let m = &db.load_completed_matches().unwrap()[0];
        assert_eq!(m.match_date, NaiveDate::from_ymd_opt(2019, 5, 12));
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    #[test]
    fn list_players_searches_case_insensitively() {
        let db = test_db();
        db.upsert_players(&[
            sample_player(1, "MS Dhoni"),
            sample_player(2, "Rohit Sharma"),
            sample_player(3, "Ishan Kishan"),
        ])
        .unwrap();

        let found = db.list_players(Some("sharma"), 10, 0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Rohit Sharma");

        let all = db.list_players(None, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn list_players_pages() {
        let db = test_db();
        db.upsert_players(&[
            sample_player(1, "A"),
            sample_player(2, "B"),
            sample_player(3, "C"),
        ])
        .unwrap();

        let page = db.list_players(None, 2, 1).unwrap();
        let ids: Vec<i64> = page.iter().map(|p| p.player_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn get_player_unknown_is_none() {
        let db = test_db();
        assert!(db.get_player(42).unwrap().is_none());
        db.upsert_players(&[sample_player(42, "Virat Kohli")]).unwrap();
        assert_eq!(db.get_player(42).unwrap().unwrap().name, "Virat Kohli");
    }

    // ------------------------------------------------------------------
    // Scorecards
    // ------------------------------------------------------------------

    #[test]
    fn batting_entries_round_trip_not_out_flag() {
        let db = test_db();
        db.insert_batting_cards(&[
            sample_batting(1, 10, 45, true),
            sample_batting(2, 10, 12, false),
            sample_batting(2, 11, 99, true),
        ])
        .unwrap();

        let entries = db.batting_entries_for_player(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_out);
        assert_eq!(entries[0].wicket_type.as_deref(), Some("caught"));
        assert!(!entries[1].is_out);
        assert!(entries[1].wicket_type.is_none());
    }

    #[test]
    fn bowling_entries_round_trip() {
        let db = test_db();
        db.insert_bowling_cards(&[BowlingCardEntry {
            match_id: 1,
            team: "Chennai Super Kings".into(),
            player_id: 20,
            overs: 3.4,
            runs_conceded: 28,
            wickets: 2,
            economy: 7.64,
        }])
        .unwrap();

        let spells = db.bowling_entries_for_player(20).unwrap();
        assert_eq!(spells.len(), 1);
        assert!((spells[0].overs - 3.4).abs() < f64::EPSILON);
        assert_eq!(spells[0].wickets, 2);
        assert!(db.bowling_entries_for_player(21).unwrap().is_empty());
    }

    #[test]
    fn table_counts_track_inserts() {
        let db = test_db();
        db.insert_balls(&[BallEvent {
            match_id: 1,
            innings_no: 1,
            over_number: 0,
            ball_number: 1,
            batsman_id: 10,
            bowler_id: 20,
            total_runs: 4,
            batsman_runs: 4,
            is_four: true,
            is_six: false,
            is_wicket: false,
            dismissal_kind: None,
        }])
        .unwrap();
        db.upsert_players(&[sample_player(1, "A")]).unwrap();

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.ball_by_ball, 1);
        assert_eq!(counts.players, 1);
        assert_eq!(counts.matches, 0);
    }

    fn sample_ball(match_id: i64, bowler_id: i64) -> BallEvent {
        BallEvent {
            match_id,
            innings_no: 1,
            over_number: 0,
            ball_number: 1,
            batsman_id: 10,
            bowler_id,
            total_runs: 1,
            batsman_runs: 1,
            is_four: false,
            is_six: false,
            is_wicket: false,
            dismissal_kind: None,
        }
    }

    #[test]
    fn scorecards_may_reference_unknown_players_and_matches() {
        let db = test_db();
        db.upsert_players(&[sample_player(10, "A")]).unwrap();
        db.upsert_matches(&[sample_match(1, Some("2023-04-01"), (180, 170))])
            .unwrap();

        // Bowler 99, player 0 and match 555 exist nowhere in the store.
        db.insert_balls(&[sample_ball(1, 99), sample_ball(555, 10)])
            .unwrap();
        db.insert_batting_cards(&[sample_batting(1, 0, 12, true)])
            .unwrap();

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.ball_by_ball, 2);
        assert_eq!(counts.batting_cards, 1);
    }

    #[test]
    fn replace_scorecards_swaps_previous_rows() {
        let db = test_db();
        db.replace_scorecards(
            &[sample_batting(1, 10, 45, true), sample_batting(1, 11, 3, true)],
            &[],
            &[sample_ball(1, 20)],
        )
        .unwrap();
        db.replace_scorecards(&[sample_batting(1, 10, 45, true)], &[], &[sample_ball(1, 20)])
            .unwrap();

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.batting_cards, 1);
        assert_eq!(counts.ball_by_ball, 1);
    }

    #[test]
    fn failed_reload_keeps_previous_scorecards() {
        let db = test_db();
        db.replace_scorecards(&[sample_batting(1, 10, 45, true)], &[], &[sample_ball(1, 20)])
            .unwrap();

        db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_ball BEFORE INSERT ON ball_by_ball
                 WHEN NEW.match_id = 999
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = db.replace_scorecards(
            &[sample_batting(2, 11, 7, false)],
            &[],
            &[sample_ball(2, 20), sample_ball(999, 20)],
        );
        assert!(result.is_err());

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.batting_cards, 1);
        assert_eq!(counts.ball_by_ball, 1);
        assert_eq!(db.batting_entries_for_player(10).unwrap().len(), 1);
        assert!(db.batting_entries_for_player(11).unwrap().is_empty());
    }
}
