use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::error::SimulationError;

/// Odds API market keys for player props
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    PlayerThrees,
    PlayerPoints,
    PlayerRebounds,
    PlayerAssists,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::PlayerThrees => "player_threes",
            Market::PlayerPoints => "player_points",
            Market::PlayerRebounds => "player_rebounds",
            Market::PlayerAssists => "player_assists",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "player_threes" => Some(Market::PlayerThrees),
            "player_points" => Some(Market::PlayerPoints),
            "player_rebounds" => Some(Market::PlayerRebounds),
            "player_assists" => Some(Market::PlayerAssists),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Over,
    Under,
}

impl Side {
    /// Same label serde writes for the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Over => "Over",
            Side::Under => "Under",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "over" => Some(Side::Over),
            "under" => Some(Side::Under),
            _ => None,
        }
    }
}

/// One sportsbook offer on one side of a player line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRow {
    pub player_name: String,
    pub prop_type: Market,
    /// Opponent team the player faces tonight
    pub defensive_matchup: String,
    /// The betting line
    pub points: f64,
    /// American odds
    pub price: i32,
    pub side: Side,
    pub bookmaker: String,
}

impl PropRow {
    pub fn line_key(&self) -> LineKey {
        LineKey::new(&self.player_name, &self.defensive_matchup, self.points)
    }
}

/// Join key between a simulated line and the offers quoted on it.
#[derive(Debug, Clone)]
pub struct LineKey {
    pub player_name: String,
    pub defensive_matchup: String,
    pub points: f64,
}

impl LineKey {
    pub fn new(player_name: &str, defensive_matchup: &str, points: f64) -> Self {
        LineKey {
            player_name: player_name.to_string(),
            defensive_matchup: defensive_matchup.to_string(),
            points,
        }
    }
}

// Lines are exact quotes (x.5 in practice), so bitwise equality is the join.
impl PartialEq for LineKey {
    fn eq(&self, other: &Self) -> bool {
        self.player_name == other.player_name
            && self.defensive_matchup == other.defensive_matchup
            && self.points.to_bits() == other.points.to_bits()
    }
}

impl Eq for LineKey {}

impl Hash for LineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.player_name.hash(state);
        self.defensive_matchup.hash(state);
        self.points.to_bits().hash(state);
    }
}

/// Simulated probabilities for one line. `p_over + p_under <= 1`; the gap is
/// the push probability on integer lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationResult {
    pub p_over: f64,
    pub p_under: f64,
}

impl SimulationResult {
    /// Score a line against a vector of simulated makes.
    pub fn from_simulated(simulated: &[u32], line: f64) -> Self {
        if simulated.is_empty() {
            return SimulationResult {
                p_over: 0.0,
                p_under: 0.0,
            };
        }
        let n = simulated.len() as f64;
        let over = simulated.iter().filter(|&&m| m as f64 > line).count() as f64;
        let under = simulated.iter().filter(|&&m| (m as f64) < line).count() as f64;
        SimulationResult {
            p_over: over / n,
            p_under: under / n,
        }
    }

    pub fn probability_for(&self, side: Side) -> f64 {
        match side {
            Side::Over => self.p_over,
            Side::Under => self.p_under,
        }
    }
}

/// A prop offer with its betting-value metrics
#[derive(Debug, Clone, PartialEq)]
pub struct RankedBet {
    pub prop: PropRow,
    pub p_over: f64,
    pub p_under: f64,
    pub implied_odds: f64,
    pub edge: f64,
    pub ev: f64,
    pub suggested_kelly: f64,
}

/// One historical box-score line for a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    pub player_name: String,
    pub team: String,
    pub opponent: String,
    pub game_date: NaiveDate,
    /// Three-point attempts
    pub fg3a: u32,
    /// Three-pointers made
    pub fg3m: u32,
}

/// How an opponent defends the three relative to the league
#[derive(Debug, Clone, PartialEq)]
pub struct DefensiveProfile {
    pub opponent: String,
    pub fg3_pct_allowed: f64,
    pub league_fg3_pct: f64,
}

impl DefensiveProfile {
    /// Multiplicative adjustment applied to a shooter's make rate.
    /// Fails unless the league rate is positive and the ratio finite and
    /// non-negative.
    pub fn adjustment(&self) -> Result<f64, SimulationError> {
        let league_known = self.league_fg3_pct > 0.0;
        let ratio = self.fg3_pct_allowed / self.league_fg3_pct;
        if !league_known || !ratio.is_finite() || ratio < 0.0 {
            return Err(SimulationError::MalformedData {
                subject: self.opponent.clone(),
                reason: format!(
                    "{} allowed against league {}",
                    self.fg3_pct_allowed, self.league_fg3_pct
                ),
            });
        }
        Ok(ratio)
    }
}
