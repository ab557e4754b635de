use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::models::{LineKey, Market, PropRow, RankedBet, SimulationResult};
use crate::error::MathError;
use crate::odds_api::OddsProvider;
use crate::store::{CacheKey, PropStore};

use super::betting_math::{
    edge_for_over_under, expected_value, implied_probability, suggested_kelly,
};
use super::simulator::{PlayerSimulator, SimulationParams};

/// Markets this pipeline simulates.
pub const SIMULATED_MARKETS: [Market; 1] = [Market::PlayerThrees];

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub params: SimulationParams,
    /// Persist the day's prop snapshot after a live fetch
    pub save_intermediate: bool,
    /// Task `i` simulates with `StdRng::seed_from_u64(seed + i)`
    pub seed: u64,
    /// Upper bound on concurrent simulations
    pub workers: usize,
    pub kelly_cap: f64,
    /// How many top bets to log at the end of a run
    pub top_n: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_fetched: usize,
    pub players_simulated: usize,
    pub players_skipped: usize,
    pub lines_simulated: usize,
    pub bets_ranked: usize,
    pub positive_ev: usize,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub bets: Vec<RankedBet>,
    pub summary: RunSummary,
}

/// One simulation unit: a player against tonight's opponent, with every
/// distinct line quoted on them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGroup {
    pub player_name: String,
    pub defensive_matchup: String,
    pub lines: Vec<f64>,
}

/// Fetch → simulate → score → rank → export, once per day.
pub struct Pipeline {
    odds: Arc<dyn OddsProvider>,
    store: Arc<dyn PropStore>,
    simulator: Arc<dyn PlayerSimulator>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        odds: Arc<dyn OddsProvider>,
        store: Arc<dyn PropStore>,
        simulator: Arc<dyn PlayerSimulator>,
        settings: PipelineSettings,
    ) -> Self {
        Pipeline {
            odds,
            store,
            simulator,
            settings,
        }
    }

    pub async fn run(&self, date: NaiveDate) -> Result<RunOutcome> {
        let key = CacheKey::new(date, &SIMULATED_MARKETS);
        let feed = self.fetch_or_load(&key).await?;
        let mut summary = RunSummary {
            rows_fetched: feed.len(),
            ..Default::default()
        };

        let threes: Vec<PropRow> = feed
            .into_iter()
            .filter(|row| row.prop_type == Market::PlayerThrees)
            .collect();

        let groups = group_by_player(&threes);
        info!(
            "Simulating {} players across {} three-point offers",
            groups.len(),
            threes.len()
        );

        let (results, skipped) = self.simulate_each_player(groups).await;
        summary.players_skipped = skipped;
        summary.lines_simulated = results.len();

        let joined = join_results(threes, &results);
        summary.players_simulated = {
            let mut players: Vec<&str> =
                joined.iter().map(|(r, _)| r.player_name.as_str()).collect();
            players.sort_unstable();
            players.dedup();
            players.len()
        };

        let mut bets = apply_betting_math(joined, self.settings.kelly_cap);
        rank(&mut bets);
        summary.bets_ranked = bets.len();
        summary.positive_ev = bets.iter().filter(|b| b.ev > 0.0).count();

        self.store
            .write_results(date, &bets)
            .context("Failed to write simulation results")?;

        info!(
            "Run complete: {} rows fetched, {} players simulated, {} skipped, {} bets ranked ({} +EV)",
            summary.rows_fetched,
            summary.players_simulated,
            summary.players_skipped,
            summary.bets_ranked,
            summary.positive_ev
        );
        for bet in bets.iter().filter(|b| b.ev > 0.0).take(self.settings.top_n) {
            info!(
                "  {} {} {} vs {} @ {} ({}): p={:.3} edge={:+.3} ev={:+.3} kelly={:.3}",
                bet.prop.player_name,
                bet.prop.side.as_str(),
                bet.prop.points,
                bet.prop.defensive_matchup,
                bet.prop.price,
                bet.prop.bookmaker,
                bet.implied_odds + bet.edge,
                bet.edge,
                bet.ev,
                bet.suggested_kelly
            );
        }

        Ok(RunOutcome { bets, summary })
    }

    /// Cache-aside load of the day's feed: read the snapshot when present,
    /// otherwise fetch live and (optionally) persist it.
    pub async fn fetch_or_load(&self, key: &CacheKey) -> Result<Vec<PropRow>> {
        if let Some(rows) = self
            .store
            .load_props(key)
            .context("Failed to read cached props")?
        {
            info!("Loaded {} cached props for {}", rows.len(), key.date);
            return Ok(rows);
        }

        info!("No cached props for {}, fetching from {}", key.date, self.odds.name());
        let rows = self
            .odds
            .fetch_player_props(&key.markets)
            .await
            .with_context(|| format!("Failed to fetch props from {}", self.odds.name()))?;

        if self.settings.save_intermediate {
            self.store
                .save_props(key, &rows)
                .context("Failed to save prop snapshot")?;
            info!("Saved {} props for {}", rows.len(), key.date);
        }
        Ok(rows)
    }

    /// Simulate every group on the blocking pool. Failures are logged and
    /// isolated to their player. Returns results per line and the number of
    /// skipped players.
    async fn simulate_each_player(
        &self,
        groups: Vec<PlayerGroup>,
    ) -> (HashMap<LineKey, SimulationResult>, usize) {
        let params = self.settings.params;
        let base_seed = self.settings.seed;

        let outcomes = stream::iter(groups.into_iter().enumerate().map(|(idx, group)| {
            let simulator = Arc::clone(&self.simulator);
            let seed = base_seed.wrapping_add(idx as u64);
            async move {
                let player = group.player_name.clone();
                let matchup = group.defensive_matchup.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    simulator.simulate(&player, &matchup, &params, &mut rng)
                })
                .await;
                (group, outcome)
            }
        }))
        .buffer_unordered(self.settings.workers.max(1))
        .collect::<Vec<_>>()
        .await;

        let mut results = HashMap::new();
        let mut skipped = 0;
        for (group, outcome) in outcomes {
            let simulated = match outcome {
                Ok(Ok(simulated)) => simulated,
                Ok(Err(e)) => {
                    error!(
                        "Error simulating {} against {}: {}",
                        group.player_name, group.defensive_matchup, e
                    );
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        "Simulation task for {} against {} failed: {}",
                        group.player_name, group.defensive_matchup, e
                    );
                    skipped += 1;
                    continue;
                }
            };

            if simulated.iter().all(|&m| m == 0) {
                warn!(
                    "Degenerate simulation for {} against {} (no makes), skipping",
                    group.player_name, group.defensive_matchup
                );
                skipped += 1;
                continue;
            }

            for line in &group.lines {
                results.insert(
                    LineKey::new(&group.player_name, &group.defensive_matchup, *line),
                    SimulationResult::from_simulated(&simulated, *line),
                );
            }
        }
        (results, skipped)
    }
}

// ── Stages ───────────────────────────────────────────────────────────────────

/// Collapse the feed to one unit per (player, matchup) holding its distinct
/// lines, in first-appearance order. Over and under offers, and the same line
/// from several books, share one unit.
pub fn group_by_player(rows: &[PropRow]) -> Vec<PlayerGroup> {
    let mut groups: Vec<PlayerGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for row in rows {
        let key = (row.player_name.clone(), row.defensive_matchup.clone());
        let idx = *index.entry(key).or_insert_with(|| {
            groups.push(PlayerGroup {
                player_name: row.player_name.clone(),
                defensive_matchup: row.defensive_matchup.clone(),
                lines: Vec::new(),
            });
            groups.len() - 1
        });
        let lines = &mut groups[idx].lines;
        if !lines.iter().any(|l| l.to_bits() == row.points.to_bits()) {
            lines.push(row.points);
        }
    }
    groups
}

/// Attach each offer's simulation result; offers without one are dropped.
pub fn join_results(
    rows: Vec<PropRow>,
    results: &HashMap<LineKey, SimulationResult>,
) -> Vec<(PropRow, SimulationResult)> {
    rows.into_iter()
        .filter_map(|row| {
            let sim = *results.get(&row.line_key())?;
            Some((row, sim))
        })
        .collect()
}

fn score_row(
    prop: PropRow,
    sim: SimulationResult,
    kelly_cap: f64,
) -> Result<RankedBet, MathError> {
    let implied = implied_probability(prop.price)?;
    let p = sim.probability_for(prop.side);
    let edge = edge_for_over_under(&sim, prop.side, implied)?;
    let ev = expected_value(p, prop.price)?;
    let kelly = suggested_kelly(p, implied, prop.price, kelly_cap)?;
    Ok(RankedBet {
        prop,
        p_over: sim.p_over,
        p_under: sim.p_under,
        implied_odds: implied,
        edge,
        ev,
        suggested_kelly: kelly,
    })
}

/// Row-wise betting math. A row with invalid numbers is dropped on its own.
pub fn apply_betting_math(
    joined: Vec<(PropRow, SimulationResult)>,
    kelly_cap: f64,
) -> Vec<RankedBet> {
    joined
        .into_iter()
        .filter_map(|(prop, sim)| {
            let label = format!(
                "{} {} {} @ {}",
                prop.player_name,
                prop.side.as_str(),
                prop.points,
                prop.price
            );
            match score_row(prop, sim, kelly_cap) {
                Ok(bet) => Some(bet),
                Err(e) => {
                    warn!("Dropping {}: {}", label, e);
                    None
                }
            }
        })
        .collect()
}

/// EV descending; equal EVs keep feed order.
pub fn rank(bets: &mut [RankedBet]) {
    bets.sort_by(|a, b| b.ev.total_cmp(&a.ev));
}
