//! Bracket scheduler host.
//!
//! Connects the progression engine to PostgreSQL, arms deadline timers for
//! every pending tournament and sweeps for overdue ones until interrupted.

mod config;
mod logging;
mod metrics;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use team_bracket::{TournamentManager, db::Database};

use crate::config::{CliOverrides, ServerConfig};
use crate::scheduler::TournamentScheduler;

const HELP: &str = "\
Run the tournament bracket scheduler

USAGE:
  tb_server [OPTIONS]

OPTIONS:
  --db-url          URL        Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/bracket_db]
  --min-teams       N          Teams required to start a bracket  [default: env BRACKET_MIN_TEAMS or 4]
  --sweep-interval  SECS       Seconds between overdue sweeps  [default: env SWEEP_INTERVAL_SECS or 60]
  --metrics-bind    IP:PORT    Prometheus exporter address  [default: env METRICS_BIND, disabled if unset]

FLAGS:
  -h, --help                   Print help information

ENVIRONMENT:
  DATABASE_URL                 PostgreSQL connection string
  DB_MAX_CONNECTIONS           Pool size
  RUST_LOG                     Log filter (e.g., info,team_bracket=debug)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        min_teams: pargs.opt_value_from_str("--min-teams")?,
        sweep_interval_secs: pargs.opt_value_from_str("--sweep-interval")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;
    info!("Starting bracket scheduler (min teams: {})", config.bracket.min_teams);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exposed at http://{}/metrics", addr);
    }

    // Initialize database
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.migrate()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database connected successfully");

    let (tournaments, registry, matches) = db.stores();
    let manager = TournamentManager::new(
        Arc::new(tournaments),
        Arc::new(registry),
        Arc::new(matches),
        config.bracket.clone(),
    );

    let scheduler = TournamentScheduler::new(manager);
    scheduler
        .reload_pending()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load pending tournaments: {}", e))?;

    let sweep = scheduler.spawn_sweep(Duration::from_secs(config.sweep_interval_secs));
    info!("Scheduler is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down scheduler...");
    sweep.abort();
    scheduler.shutdown().await;
    db.close().await;

    Ok(())
}
