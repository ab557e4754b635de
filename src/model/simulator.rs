//! Per-player Monte Carlo simulation of three-pointers made.
//!
//! The shooter's history is bootstrap-resampled to get a distribution of
//! (attempts per game, make rate) pairs. Make rates are scaled by how the
//! opponent defends the three relative to the league. Each synthetic game
//! then draws one bootstrap pair, sets an attempt count through the
//! configured attempts policy and draws makes from a binomial.
//!
//! The historical data is injected through [`PerformanceSource`] and the
//! random source is passed in by the caller, so results are reproducible
//! under a fixed seed.

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;

use crate::db::models::{DefensiveProfile, GameLog};
use crate::error::SimulationError;

/// Historical performance lookup consumed by the simulator.
pub trait PerformanceSource: Send + Sync {
    /// Every recorded game for the player.
    fn player_game_logs(&self, player_name: &str) -> Result<Vec<GameLog>, SimulationError>;

    /// Three-point defence of the opponent relative to the league.
    fn defensive_profile(&self, opponent: &str) -> Result<DefensiveProfile, SimulationError>;
}

/// Anything that can turn a player + opponent into simulated makes.
/// The pipeline depends on this seam rather than on [`OutcomeSimulator`].
pub trait PlayerSimulator: Send + Sync {
    fn simulate(
        &self,
        player_name: &str,
        defensive_matchup: &str,
        params: &SimulationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<u32>, SimulationError>;
}

// ── Attempts policies ────────────────────────────────────────────────────────

/// Inputs available to an attempts policy for one synthetic game.
#[derive(Debug, Clone, Copy)]
pub struct AttemptParams {
    /// Mean attempts per game over the full history.
    pub historical_mean: f64,
    /// Mean attempts per game in the bootstrap resample drawn for this game.
    pub resample_mean: f64,
}

pub trait AttemptsPolicy: Send + Sync {
    fn estimate_attempts(&self, params: &AttemptParams) -> f64;
}

/// Fixed volume: the player's season average every game.
pub struct SimpleAttempts;

impl AttemptsPolicy for SimpleAttempts {
    fn estimate_attempts(&self, params: &AttemptParams) -> f64 {
        params.historical_mean
    }
}

/// Volume varies with the bootstrap resample.
pub struct BootstrapAttempts;

impl AttemptsPolicy for BootstrapAttempts {
    fn estimate_attempts(&self, params: &AttemptParams) -> f64 {
        params.resample_mean
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FgaMethod {
    Simple,
    Bootstrap,
}

impl FgaMethod {
    pub fn policy(&self) -> &'static dyn AttemptsPolicy {
        match self {
            FgaMethod::Simple => &SimpleAttempts,
            FgaMethod::Bootstrap => &BootstrapAttempts,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    pub bootstrap_samples: usize,
    pub n_simulated_games: usize,
    pub fga_method: FgaMethod,
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.bootstrap_samples == 0 {
            return Err(SimulationError::InvalidParameters(
                "bootstrap_samples must be positive".into(),
            ));
        }
        if self.n_simulated_games == 0 {
            return Err(SimulationError::InvalidParameters(
                "n_simulated_games must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ── Simulator ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct BootstrapDraw {
    mean_attempts: f64,
    make_rate: f64,
}

pub struct OutcomeSimulator {
    source: Arc<dyn PerformanceSource>,
}

impl OutcomeSimulator {
    pub fn new(source: Arc<dyn PerformanceSource>) -> Self {
        OutcomeSimulator { source }
    }

    /// Simulate `n_simulated_games` games of `player_name` against
    /// `defensive_matchup` and return the makes of each game.
    pub fn run(
        &self,
        player_name: &str,
        defensive_matchup: &str,
        params: &SimulationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<u32>, SimulationError> {
        params.validate()?;

        let logs = self.source.player_game_logs(player_name)?;
        if logs.is_empty() {
            return Err(SimulationError::DataUnavailable(player_name.to_string()));
        }
        if let Some(bad) = logs.iter().find(|g| g.fg3m > g.fg3a) {
            return Err(SimulationError::MalformedData {
                subject: player_name.to_string(),
                reason: format!(
                    "{} makes on {} attempts on {}",
                    bad.fg3m, bad.fg3a, bad.game_date
                ),
            });
        }

        let defense = self.source.defensive_profile(defensive_matchup)?;
        let adjustment = defense.adjustment()?;

        let draws = bootstrap(&logs, params.bootstrap_samples, adjustment, rng);
        let total_attempts: u64 = logs.iter().map(|g| g.fg3a as u64).sum();
        let historical_mean = total_attempts as f64 / logs.len() as f64;
        let policy = params.fga_method.policy();

        let mut makes = Vec::with_capacity(params.n_simulated_games);
        for _ in 0..params.n_simulated_games {
            let draw = draws[rng.gen_range(0..draws.len())];
            let expected = policy.estimate_attempts(&AttemptParams {
                historical_mean,
                resample_mean: draw.mean_attempts,
            });
            let attempts = stochastic_round(expected, rng);
            makes.push(binomial(attempts, draw.make_rate, rng));
        }
        Ok(makes)
    }
}

impl PlayerSimulator for OutcomeSimulator {
    fn simulate(
        &self,
        player_name: &str,
        defensive_matchup: &str,
        params: &SimulationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<u32>, SimulationError> {
        self.run(player_name, defensive_matchup, params, rng)
    }
}

/// Resample the game logs with replacement `samples` times.
fn bootstrap(
    logs: &[GameLog],
    samples: usize,
    adjustment: f64,
    rng: &mut StdRng,
) -> Vec<BootstrapDraw> {
    let n = logs.len();
    (0..samples)
        .map(|_| {
            let mut attempts = 0u64;
            let mut made = 0u64;
            for _ in 0..n {
                let game = &logs[rng.gen_range(0..n)];
                attempts += game.fg3a as u64;
                made += game.fg3m as u64;
            }
            let raw_rate = if attempts == 0 {
                0.0
            } else {
                made as f64 / attempts as f64
            };
            BootstrapDraw {
                mean_attempts: attempts as f64 / n as f64,
                make_rate: (raw_rate * adjustment).clamp(0.0, 1.0),
            }
        })
        .collect()
}

/// Round to an integer while preserving the expectation.
fn stochastic_round(x: f64, rng: &mut StdRng) -> u32 {
    if !x.is_finite() || x <= 0.0 {
        return 0;
    }
    let floor = x.floor();
    let frac = x - floor;
    let bump = if rng.gen_bool(frac.clamp(0.0, 1.0)) { 1 } else { 0 };
    floor as u32 + bump
}

fn binomial(trials: u32, p: f64, rng: &mut StdRng) -> u32 {
    let p = p.clamp(0.0, 1.0);
    (0..trials).filter(|_| rng.gen_bool(p)).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use std::collections::HashMap;

    struct FakeHistory {
        logs: HashMap<String, Vec<GameLog>>,
        defenses: HashMap<String, f64>,
    }

    impl FakeHistory {
        fn new() -> Self {
            FakeHistory {
                logs: HashMap::new(),
                defenses: HashMap::new(),
            }
        }

        fn with_player(mut self, name: &str, games: &[(u32, u32)]) -> Self {
            let logs = games
                .iter()
                .enumerate()
                .map(|(i, &(fg3a, fg3m))| GameLog {
                    player_name: name.into(),
                    team: "Golden State Warriors".into(),
                    opponent: "Sacramento Kings".into(),
                    game_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
                        + chrono::Duration::days(i as i64),
                    fg3a,
                    fg3m,
                })
                .collect();
            self.logs.insert(name.into(), logs);
            self
        }

        fn with_defense(mut self, team: &str, pct_allowed: f64) -> Self {
            self.defenses.insert(team.into(), pct_allowed);
            self
        }
    }

    impl PerformanceSource for FakeHistory {
        fn player_game_logs(&self, player_name: &str) -> Result<Vec<GameLog>, SimulationError> {
            self.logs
                .get(player_name)
                .cloned()
                .ok_or_else(|| SimulationError::DataUnavailable(player_name.into()))
        }

        fn defensive_profile(&self, opponent: &str) -> Result<DefensiveProfile, SimulationError> {
            let pct = self
                .defenses
                .get(opponent)
                .ok_or_else(|| SimulationError::DataUnavailable(opponent.into()))?;
            Ok(DefensiveProfile {
                opponent: opponent.into(),
                fg3_pct_allowed: *pct,
                league_fg3_pct: 0.40,
            })
        }
    }

    fn params(method: FgaMethod) -> SimulationParams {
        SimulationParams {
            bootstrap_samples: 500,
            n_simulated_games: 20_000,
            fga_method: method,
        }
    }

    fn simulator(history: FakeHistory) -> OutcomeSimulator {
        OutcomeSimulator::new(Arc::new(history))
    }

    fn mean(v: &[u32]) -> f64 {
        v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64
    }

    #[test]
    fn returns_one_value_per_simulated_game() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Stephen Curry", &[(12, 5), (10, 4), (11, 3)])
                .with_defense("Boston Celtics", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(7);
        let out = sim
            .run("Stephen Curry", "Boston Celtics", &params(FgaMethod::Simple), &mut rng)
            .unwrap();
        assert_eq!(out.len(), 20_000);
        assert!(out.iter().all(|&m| m <= 13));
    }

    #[test]
    fn constant_shooter_matches_binomial_mean() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Shooter", &[(10, 4); 20])
                .with_defense("Neutral", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let out = sim
            .run("Shooter", "Neutral", &params(FgaMethod::Simple), &mut rng)
            .unwrap();
        assert_relative_eq!(mean(&out), 4.0, epsilon = 0.1);
    }

    #[test]
    fn weak_defense_raises_makes() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Shooter", &[(10, 4); 20])
                .with_defense("Leaky", 0.50),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let out = sim
            .run("Shooter", "Leaky", &params(FgaMethod::Simple), &mut rng)
            .unwrap();
        // 0.4 rate scaled by 0.5 / 0.4
        assert_relative_eq!(mean(&out), 5.0, epsilon = 0.1);
    }

    #[test]
    fn bootstrap_policy_tracks_volume() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Volume", &[(4, 2), (12, 6), (8, 4), (6, 3)])
                .with_defense("Neutral", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(3);
        let out = sim
            .run("Volume", "Neutral", &params(FgaMethod::Bootstrap), &mut rng)
            .unwrap();
        // 7.5 attempts at 50%
        assert_relative_eq!(mean(&out), 3.75, epsilon = 0.15);
    }

    #[test]
    fn same_seed_same_result() {
        let history = FakeHistory::new()
            .with_player("Stephen Curry", &[(12, 5), (10, 4), (11, 3), (14, 7)])
            .with_defense("Boston Celtics", 0.37);
        let sim = simulator(history);
        let p = params(FgaMethod::Simple);

        let a = sim
            .run("Stephen Curry", "Boston Celtics", &p, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = sim
            .run("Stephen Curry", "Boston Celtics", &p, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let c = sim
            .run("Stephen Curry", "Boston Celtics", &p, &mut StdRng::seed_from_u64(12))
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn non_shooter_is_all_zero() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Big Man", &[(0, 0); 10])
                .with_defense("Neutral", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(1);
        let out = sim
            .run("Big Man", "Neutral", &params(FgaMethod::Simple), &mut rng)
            .unwrap();
        assert_eq!(out.iter().sum::<u32>(), 0);
    }

    #[test]
    fn unknown_player_is_data_unavailable() {
        let sim = simulator(FakeHistory::new().with_defense("Neutral", 0.40));
        let mut rng = StdRng::seed_from_u64(1);
        let err = sim
            .run("Nobody", "Neutral", &params(FgaMethod::Simple), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimulationError::DataUnavailable(_)));
    }

    #[test]
    fn unknown_opponent_is_data_unavailable() {
        let sim = simulator(FakeHistory::new().with_player("Shooter", &[(5, 2)]));
        let mut rng = StdRng::seed_from_u64(1);
        let err = sim
            .run("Shooter", "Expansion Team", &params(FgaMethod::Simple), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimulationError::DataUnavailable(_)));
    }

    #[test]
    fn empty_history_is_data_unavailable() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Rookie", &[])
                .with_defense("Neutral", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(1);
        let err = sim
            .run("Rookie", "Neutral", &params(FgaMethod::Simple), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimulationError::DataUnavailable(_)));
    }

    #[test]
    fn more_makes_than_attempts_is_malformed() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Typo", &[(5, 2), (3, 4)])
                .with_defense("Neutral", 0.40),
        );
        let mut rng = StdRng::seed_from_u64(1);
        let err = sim
            .run("Typo", "Neutral", &params(FgaMethod::Simple), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimulationError::MalformedData { .. }));
    }

    #[test]
    fn unusable_defense_is_malformed() {
        let sim = simulator(
            FakeHistory::new()
                .with_player("Shooter", &[(8, 3), (6, 2)])
                .with_defense("Broken", f64::NAN),
        );
        let mut rng = StdRng::seed_from_u64(1);
        let err = sim
            .run("Shooter", "Broken", &params(FgaMethod::Simple), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SimulationError::MalformedData { .. }));
    }

    #[test]
    fn zero_games_is_invalid() {
        let sim = simulator(FakeHistory::new());
        let mut rng = StdRng::seed_from_u64(1);
        let p = SimulationParams {
            bootstrap_samples: 10,
            n_simulated_games: 0,
            fga_method: FgaMethod::Simple,
        };
        let err = sim.run("Anyone", "Anyone", &p, &mut rng).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidParameters(_)));
    }

    #[test]
    fn stochastic_round_preserves_mean() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 50_000;
        let total: u64 = (0..n).map(|_| stochastic_round(2.3, &mut rng) as u64).sum();
        assert_relative_eq!(total as f64 / n as f64, 2.3, epsilon = 0.02);
        assert_eq!(stochastic_round(-1.0, &mut rng), 0);
        assert_eq!(stochastic_round(f64::NAN, &mut rng), 0);
        assert_eq!(stochastic_round(3.0, &mut rng), 3);
    }
}
