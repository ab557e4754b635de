use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::betting_math::DEFAULT_KELLY_CAP;
use crate::model::FgaMethod;

/// Three-point prop simulator and bet ranker
#[derive(Parser, Debug, Clone)]
#[command(name = "threes-props", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Root folder for prop snapshots and simulation results
    #[arg(long, env = "EXPORT_FOLDER", default_value = "exports")]
    pub export_folder: PathBuf,

    /// The Odds API key (only needed when today's snapshot is not cached)
    #[arg(long, env = "ODDS_API_KEY")]
    pub odds_api_key: Option<String>,

    /// The Odds API base URL
    #[arg(long, env = "ODDS_API_URL", default_value = "https://api.the-odds-api.com")]
    pub odds_api_url: String,

    /// Bookmaker regions to request (comma separated)
    #[arg(long, env = "ODDS_REGIONS", default_value = "us")]
    pub odds_regions: String,

    /// SQLite database holding historical game logs
    #[arg(long, env = "DATABASE_PATH", default_value = "game_logs.db")]
    pub database_path: String,

    /// Persist the day's prop snapshot after fetching it
    #[arg(long, env = "SAVE_INTERMEDIATE", default_value = "true", action = ArgAction::Set)]
    pub save: bool,

    /// Bootstrap resamples of each player's history
    #[arg(long, env = "BOOTSTRAP_SAMPLES", default_value = "100000")]
    pub bootstrap_samples: usize,

    /// Synthetic games simulated per player
    #[arg(long, env = "N_SIMULATED_GAMES", default_value = "200000")]
    pub n_simulated_games: usize,

    /// Attempts-per-game policy
    #[arg(long, env = "FGA_METHOD", value_enum, default_value = "simple")]
    pub fga_method: FgaMethod,

    /// RNG seed; random (and logged) when omitted
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    /// Concurrent player simulations (defaults to available cores)
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Ceiling on the suggested Kelly stake (0.0–1.0]
    #[arg(long, env = "KELLY_CAP", default_value_t = DEFAULT_KELLY_CAP)]
    pub kelly_cap: f64,

    /// Number of +EV bets to print at the end of a run
    #[arg(long, env = "TOP_N", default_value = "10")]
    pub top_n: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Simulate today's props and write ranked results (default)
    Run,
    /// Load historical game logs from a CSV
    /// (player_name,team,opponent,game_date,fg3a,fg3m)
    ImportLogs {
        #[arg(long)]
        file: PathBuf,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bootstrap_samples == 0 {
            anyhow::bail!("bootstrap_samples must be positive");
        }
        if self.n_simulated_games == 0 {
            anyhow::bail!("n_simulated_games must be positive");
        }
        if !(self.kelly_cap > 0.0 && self.kelly_cap <= 1.0) {
            anyhow::bail!("kelly_cap must be in (0.0, 1.0]");
        }
        if self.workers == Some(0) {
            anyhow::bail!("workers must be positive");
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
