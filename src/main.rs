// src/main.rs — habitual entry point

use clap::Parser;

use habitual::cli::{self, Cli, Commands};
use habitual::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Falls back to defaults if no config.toml
    let config = cli::load_config(cli.config.as_deref())?;

    // Respects HABITUAL_LOG / RUST_LOG before the configured level
    logger::init_logging(&config.logging.level);

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_schedule,
        } => cli::serve::run_serve(config, host, port, no_schedule).await,
        Commands::Train { input } => cli::train::run_train(&config, input.as_deref()).await,
        Commands::Predict { at, limit, json } => {
            cli::query::run_predict(&config, at.as_deref(), limit, json)
        }
        Commands::Routines { json } => cli::query::run_routines(&config, json),
        Commands::Sequences { json } => cli::query::run_sequences(&config, json),
        Commands::Info => cli::query::run_info(&config),
        Commands::Migrate { status, rollback } => {
            cli::migrate::run_migrate(&config, status, rollback)
        }
    }
}
