// src/cli/mod.rs — CLI definition (clap derive)

pub mod migrate;
pub mod query;
pub mod serve;
pub mod train;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::Engine;
use crate::infra::config::Config;
use crate::storage;

#[derive(Parser)]
#[command(
    name = "habitual",
    about = "Learns smart-home habits from state history",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the nightly retraining schedule
    Serve {
        /// Port to listen on (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind (overrides [server].host)
        #[arg(long)]
        host: Option<String>,
        /// Do not retrain on a schedule
        #[arg(long)]
        no_schedule: bool,
    },
    /// Train a model and persist it
    Train {
        /// History JSON file; fetched from Home Assistant when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Predict likely state changes for a moment
    Predict {
        /// Timestamp (RFC 3339 or local ISO-8601); now when omitted
        #[arg(long)]
        at: Option<String>,
        /// Max predictions (overrides [mining].prediction_limit)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show arrival routines with automation YAML
    Routines {
        #[arg(long)]
        json: bool,
    },
    /// Show trigger -> action rules with automation YAML
    Sequences {
        #[arg(long)]
        json: bool,
    },
    /// Show metadata of the stored model
    Info,
    /// Show or change the model database schema
    Migrate {
        /// Only print applied migrations
        #[arg(long)]
        status: bool,
        /// Revert every migration
        #[arg(long)]
        rollback: bool,
    },
}

/// Load config from `--config` or the default location.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Config::load();
    };
    let mut config = Config::load_from(std::path::Path::new(path))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn engine_with_store(config: &Config) -> Engine {
    match storage::open_store(&config.storage) {
        Some(store) => {
            tracing::debug!("Model store: {}", store.describe());
            Engine::new().with_store(store)
        }
        None => Engine::new(),
    }
}

/// Engine wired to the configured store, with the last model restored.
pub fn open_engine(config: &Config) -> anyhow::Result<Arc<Engine>> {
    let engine = engine_with_store(config);
    engine.restore()?;
    Ok(Arc::new(engine))
}

/// Like [`open_engine`], but an unreadable stored model only warns and
/// leaves the engine untrained. Used by commands that can replace it.
pub fn open_engine_or_untrained(config: &Config) -> Arc<Engine> {
    let engine = engine_with_store(config);
    if let Err(e) = engine.restore() {
        tracing::warn!("Could not restore model, starting untrained: {}", e);
    }
    Arc::new(engine)
}
