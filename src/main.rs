//! counter-stack
//!
//! Runs one tier of the counter service pair.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                web tier (:8080)                     api tier (:3030)
//!     ──────▶ GET /send ──▶ instrument ─▶ downstream GET ──────▶ instrument ─▶ UPDATE + SELECT ─▶ store
//!     ──────▶ GET /*    ──▶ instrument ─▶ static files
//!
//!     both tiers: /liveness  /readiness  /metrics   SIGINT/SIGTERM → graceful drain
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use counter_stack::config::{load_config, Tier};
use counter_stack::lifecycle::{startup, DrainOutcome, StartupError};
use counter_stack::observability::logging;
use counter_stack::{store, ApiServer, GoldenSignals, WebServer};

#[derive(Parser)]
#[command(name = "counter-stack")]
#[command(about = "Counter API and web front end with golden-signal metrics", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    tier: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API tier (counter store)
    Api,
    /// Run the web tier (static files and /send)
    Web,
}

impl Command {
    fn tier(&self) -> Tier {
        match self {
            Command::Api => Tier::Api,
            Command::Web => Tier::Web,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(DrainOutcome::Drained) => ExitCode::SUCCESS,
        Ok(DrainOutcome::TimedOut) => {
            tracing::warn!("Exited with requests still in flight");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<DrainOutcome, StartupError> {
    let tier = cli.tier.tier();
    let config = load_config(cli.config.as_deref(), tier)?;
    logging::init(&config.observability)?;

    tracing::info!(%tier, version = env!("CARGO_PKG_VERSION"), "counter-stack starting");

    let signals = Arc::new(GoldenSignals::new()?);

    match tier {
        Tier::Api => {
            let listener = startup::bind(&config.api.bind_address).await?;
            ApiServer::new(&config, signals)
                .run(listener, store::connect(&config.store))
                .await
        }
        Tier::Web => {
            let server = WebServer::new(&config, signals)?;
            let listener = startup::bind(&config.web.bind_address).await?;
            server.run(listener).await
        }
    }
}
