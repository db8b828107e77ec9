// src/cli/serve.rs — Long-running API server with nightly retraining

use std::sync::Arc;

use crate::api::{self, ApiState};
use crate::infra::config::Config;
use crate::infra::scheduler;
use crate::source::{HistorySource, HomeAssistantSource};

pub async fn run_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    no_schedule: bool,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let engine = super::open_engine_or_untrained(&config);

    let source: Option<Arc<dyn HistorySource>> =
        match HomeAssistantSource::new(&config.home_assistant) {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                tracing::warn!("History source disabled: {}", e);
                None
            }
        };

    let scheduled = match (&source, config.schedule.enabled && !no_schedule) {
        (Some(source), true) => Some(tokio::spawn(scheduler::run_nightly(
            engine.clone(),
            source.clone(),
            config.mining.clone(),
            config.schedule.train_hour,
        ))),
        _ => None,
    };

    let state = ApiState {
        engine,
        mining: Arc::new(config.mining.clone()),
        token: config.server.token.clone(),
        source,
    };
    let result = api::start_server(&config.server, state).await;

    if let Some(handle) = scheduled {
        handle.abort();
    }
    result
}
