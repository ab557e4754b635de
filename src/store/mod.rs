//! Date-keyed persistence for prop snapshots and ranked results.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::db::models::{Market, PropRow, RankedBet};
use crate::error::StorageError;

const PROP_HEADERS: [&str; 7] = [
    "player_name",
    "prop_type",
    "defensive_matchup",
    "points",
    "price",
    "side",
    "bookmaker",
];

const RESULT_HEADERS: [&str; 13] = [
    "player_name",
    "prop_type",
    "defensive_matchup",
    "points",
    "price",
    "side",
    "bookmaker",
    "p_over",
    "p_under",
    "implied_odds",
    "edge",
    "ev",
    "suggested_kelly",
];

/// Identifies one day's prop snapshot for a set of markets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub date: NaiveDate,
    pub markets: Vec<Market>,
}

impl CacheKey {
    pub fn new(date: NaiveDate, markets: &[Market]) -> Self {
        CacheKey {
            date,
            markets: markets.to_vec(),
        }
    }

    /// `2025-01-15` for the threes-only feed,
    /// `2025-01-15_player_threes-player_points` otherwise.
    pub fn file_stem(&self) -> String {
        let date = self.date.format("%Y-%m-%d").to_string();
        if self.markets.is_empty() || self.markets == [Market::PlayerThrees] {
            return date;
        }
        let markets: Vec<&str> = self.markets.iter().map(|m| m.as_str()).collect();
        format!("{}_{}", date, markets.join("-"))
    }
}

/// Cache for the daily odds snapshot plus the results export.
pub trait PropStore: Send + Sync {
    /// `Ok(None)` when no snapshot exists for the key.
    fn load_props(&self, key: &CacheKey) -> Result<Option<Vec<PropRow>>, StorageError>;

    fn save_props(&self, key: &CacheKey, rows: &[PropRow]) -> Result<(), StorageError>;

    /// Overwrites any earlier results for the same date.
    fn write_results(&self, date: NaiveDate, bets: &[RankedBet]) -> Result<(), StorageError>;
}

/// CSV files under `{export_root}/player_props/` and `{export_root}/sim_results/`
pub struct CsvStore {
    export_root: PathBuf,
}

impl CsvStore {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        CsvStore {
            export_root: export_root.into(),
        }
    }

    pub fn props_path(&self, key: &CacheKey) -> PathBuf {
        self.export_root
            .join("player_props")
            .join(format!("{}.csv", key.file_stem()))
    }

    pub fn results_path(&self, date: NaiveDate) -> PathBuf {
        self.export_root
            .join("sim_results")
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    fn writer_for(path: &Path) -> Result<csv::Writer<fs::File>, StorageError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StorageError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }
        csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|source| csv_err(path, source))
    }
}

fn csv_err(path: &Path, source: csv::Error) -> StorageError {
    StorageError::Csv {
        path: path.display().to_string(),
        source,
    }
}

impl PropStore for CsvStore {
    fn load_props(&self, key: &CacheKey) -> Result<Option<Vec<PropRow>>, StorageError> {
        let path = self.props_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_err(&path, e))?;
        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<PropRow>().enumerate() {
            match record {
                Ok(row) => rows.push(row),
                Err(e) if e.is_io_error() => return Err(csv_err(&path, e)),
                Err(e) => warn!(
                    "Skipping malformed prop row {} in {}: {}",
                    i + 2,
                    path.display(),
                    e
                ),
            }
        }
        debug!("Loaded {} cached props from {}", rows.len(), path.display());
        Ok(Some(rows))
    }

    fn save_props(&self, key: &CacheKey, rows: &[PropRow]) -> Result<(), StorageError> {
        let path = self.props_path(key);
        let mut wtr = Self::writer_for(&path)?;
        wtr.write_record(PROP_HEADERS)
            .map_err(|e| csv_err(&path, e))?;
        for row in rows {
            wtr.serialize(row).map_err(|e| csv_err(&path, e))?;
        }
        wtr.flush().map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn write_results(&self, date: NaiveDate, bets: &[RankedBet]) -> Result<(), StorageError> {
        let path = self.results_path(date);
        let mut wtr = Self::writer_for(&path)?;
        wtr.write_record(RESULT_HEADERS)
            .map_err(|e| csv_err(&path, e))?;
        for bet in bets {
            let p = &bet.prop;
            wtr.write_record([
                p.player_name.clone(),
                p.prop_type.as_str().to_string(),
                p.defensive_matchup.clone(),
                p.points.to_string(),
                p.price.to_string(),
                p.side.as_str().to_string(),
                p.bookmaker.clone(),
                bet.p_over.to_string(),
                bet.p_under.to_string(),
                bet.implied_odds.to_string(),
                bet.edge.to_string(),
                bet.ev.to_string(),
                bet.suggested_kelly.to_string(),
            ])
            .map_err(|e| csv_err(&path, e))?;
        }
        wtr.flush().map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}
