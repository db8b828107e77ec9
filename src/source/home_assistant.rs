// src/source/home_assistant.rs — Home Assistant REST history client
//
// Uses GET {base}/history/period/{start}?end_time={end}, which answers with
// one list of state objects per entity.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{parse_history_json, HistorySource};
use crate::infra::config::HomeAssistantConfig;
use crate::infra::errors::EngineError;
use crate::mining::StateRecord;

pub struct HomeAssistantSource {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HomeAssistantSource {
    pub fn new(config: &HomeAssistantConfig) -> Result<Self, EngineError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            EngineError::Config(format!("invalid home_assistant.base_url: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::Config(format!(
                "home_assistant.base_url cannot be a base: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn history_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Url {
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["history", "period", start.as_str()]);
        }
        url.query_pairs_mut()
            .append_pair("end_time", &end.to_rfc3339_opts(SecondsFormat::Secs, true));
        url
    }
}

#[async_trait]
impl HistorySource for HomeAssistantSource {
    fn name(&self) -> &str {
        "home_assistant"
    }

    async fn fetch_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, EngineError> {
        let url = self.history_url(start, end);
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| EngineError::HistorySource {
            message: format!("request to {} failed: {e}", url.path()),
            retriable: e.is_timeout() || e.is_connect(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::HistorySource {
                message: format!("history API returned {status}: {body}"),
                retriable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        let body = resp.text().await.map_err(|e| EngineError::HistorySource {
            message: format!("reading history body: {e}"),
            retriable: true,
        })?;
        let records = parse_history_json(&body)?;
        tracing::info!(
            "Fetched {} historical states from {} to {}",
            records.len(),
            start.date_naive(),
            end.date_naive()
        );
        Ok(records)
    }
}
