use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub mod models;
use models::*;

use crate::error::SimulationError;
use crate::model::simulator::PerformanceSource;

/// Historical box scores backed by SQLite (single connection with mutex)
#[derive(Clone)]
pub struct GameLogDb {
    conn: Arc<Mutex<Connection>>,
}

impl GameLogDb {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = GameLogDb {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("game log database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Game logs ────────────────────────────────────────────────────────────

    /// Insert or replace game logs; returns the number of rows written
    pub fn upsert_game_logs(&self, logs: &[GameLog]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO game_logs (player_name, team, opponent, game_date, fg3a, fg3m)
                 VALUES (?1,?2,?3,?4,?5,?6)
                 ON CONFLICT(player_name, game_date) DO UPDATE SET
                    team=excluded.team,
                    opponent=excluded.opponent,
                    fg3a=excluded.fg3a,
                    fg3m=excluded.fg3m",
            )?;
            for log in logs {
                stmt.execute(params![
                    log.player_name,
                    log.team,
                    log.opponent,
                    log.game_date,
                    log.fg3a,
                    log.fg3m,
                ])?;
            }
        }
        tx.commit()?;
        Ok(logs.len())
    }

    /// Load game logs from a CSV with columns
    /// `player_name,team,opponent,game_date,fg3a,fg3m`.
    /// Unparseable records are skipped.
    pub fn import_csv(&self, path: &Path) -> Result<usize> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut logs = Vec::new();
        for (i, record) in reader.deserialize::<GameLog>().enumerate() {
            match record {
                Ok(log) if log.fg3m <= log.fg3a => logs.push(log),
                Ok(log) => warn!(
                    "Skipping game log line {}: {} made {} of {} threes",
                    i + 2,
                    log.player_name,
                    log.fg3m,
                    log.fg3a
                ),
                Err(e) => warn!("Skipping game log line {}: {}", i + 2, e),
            }
        }
        let written = self.upsert_game_logs(&logs)?;
        info!("Imported {} game logs from {}", written, path.display());
        Ok(written)
    }

    /// Most recent team per player, used to place players in tonight's games
    pub fn roster(&self) -> Result<HashMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT player_name, team FROM game_logs ORDER BY game_date ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    fn query_player_logs(&self, player_name: &str) -> Result<Vec<GameLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT player_name, team, opponent, game_date, fg3a, fg3m
             FROM game_logs WHERE player_name=?1 ORDER BY game_date ASC",
        )?;
        let logs = stmt
            .query_map(params![player_name], map_game_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// (makes, attempts) allowed by `opponent`, or league-wide when `None`
    fn query_threes_allowed(&self, opponent: Option<&str>) -> Result<(i64, i64)> {
        let conn = self.lock()?;
        let totals: (i64, i64) = match opponent {
            Some(team) => conn.query_row(
                "SELECT COALESCE(SUM(fg3m),0), COALESCE(SUM(fg3a),0)
                 FROM game_logs WHERE opponent=?1",
                params![team],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(SUM(fg3m),0), COALESCE(SUM(fg3a),0) FROM game_logs",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?,
        };
        Ok(totals)
    }
}

impl PerformanceSource for GameLogDb {
    fn player_game_logs(&self, player_name: &str) -> Result<Vec<GameLog>, SimulationError> {
        let logs = self
            .query_player_logs(player_name)
            .map_err(|e| SimulationError::Source(e.to_string()))?;
        if logs.is_empty() {
            return Err(SimulationError::DataUnavailable(player_name.to_string()));
        }
        Ok(logs)
    }

    fn defensive_profile(&self, opponent: &str) -> Result<DefensiveProfile, SimulationError> {
        let source_err = |e: anyhow::Error| SimulationError::Source(e.to_string());
        let (made, attempts) = self.query_threes_allowed(Some(opponent)).map_err(source_err)?;
        if attempts <= 0 {
            return Err(SimulationError::DataUnavailable(opponent.to_string()));
        }
        let (league_made, league_attempts) =
            self.query_threes_allowed(None).map_err(source_err)?;
        if league_attempts <= 0 || league_made <= 0 {
            return Err(SimulationError::DataUnavailable("league averages".into()));
        }
        Ok(DefensiveProfile {
            opponent: opponent.to_string(),
            fg3_pct_allowed: made as f64 / attempts as f64,
            league_fg3_pct: league_made as f64 / league_attempts as f64,
        })
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_game_log(row: &rusqlite::Row) -> rusqlite::Result<GameLog> {
    Ok(GameLog {
        player_name: row.get(0)?,
        team: row.get(1)?,
        opponent: row.get(2)?,
        game_date: row.get(3)?,
        fg3a: row.get(4)?,
        fg3m: row.get(5)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS game_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    player_name TEXT    NOT NULL,
    team        TEXT    NOT NULL,
    opponent    TEXT    NOT NULL,
    game_date   TEXT    NOT NULL,
    fg3a        INTEGER NOT NULL,
    fg3m        INTEGER NOT NULL,
    UNIQUE (player_name, game_date)
);

CREATE INDEX IF NOT EXISTS idx_game_logs_player ON game_logs(player_name);
CREATE INDEX IF NOT EXISTS idx_game_logs_opponent ON game_logs(opponent);
"#;
