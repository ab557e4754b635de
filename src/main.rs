use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

mod config;
mod db;
mod error;
mod model;
mod odds_api;
mod store;

use config::{Command, Config};
use db::GameLogDb;
use model::{OutcomeSimulator, Pipeline, PipelineSettings, SimulationParams};
use odds_api::OddsApiClient;
use store::CsvStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open historical game log database
    let db = GameLogDb::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    if let Some(Command::ImportLogs { file }) = &config.command {
        db.import_csv(file)?;
        return Ok(());
    }

    let api_key = config.odds_api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        warn!("ODDS_API_KEY not set – only a cached prop snapshot can be used today");
    }
    let roster = db.roster()?;
    info!("Roster loaded: {} players", roster.len());
    let odds = OddsApiClient::new(
        &config.odds_api_url,
        &api_key,
        &config.odds_regions,
        roster,
    )?;

    let seed = config.seed.unwrap_or_else(rand::random::<u64>);
    let settings = PipelineSettings {
        params: SimulationParams {
            bootstrap_samples: config.bootstrap_samples,
            n_simulated_games: config.n_simulated_games,
            fga_method: config.fga_method,
        },
        save_intermediate: config.save,
        seed,
        workers: config.workers(),
        kelly_cap: config.kelly_cap,
        top_n: config.top_n,
    };
    info!(
        "Simulation: {} bootstrap samples, {} games, {:?} attempts, seed={}, workers={}",
        settings.params.bootstrap_samples,
        settings.params.n_simulated_games,
        settings.params.fga_method,
        settings.seed,
        settings.workers
    );

    let pipeline = Pipeline::new(
        Arc::new(odds),
        Arc::new(CsvStore::new(&config.export_folder)),
        Arc::new(OutcomeSimulator::new(Arc::new(db.clone()))),
        settings,
    );

    let today = Local::now().date_naive();
    let outcome = pipeline.run(today).await?;
    info!(
        "Wrote {} ranked bets ({} +EV) for {} to {}",
        outcome.bets.len(),
        outcome.summary.positive_ev,
        today,
        config.export_folder.join("sim_results").display()
    );

    Ok(())
}
