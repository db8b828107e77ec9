// src/infra/scheduler.rs — Nightly retraining from the history source

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::engine::{Engine, TrainingSummary};
use crate::infra::config::MiningConfig;
use crate::infra::errors::EngineError;
use crate::source::HistorySource;

/// First instant strictly after `now` whose local hour is `train_hour`.
///
/// When the hour does not exist locally (DST gap) the next existing hour
/// that day is used.
pub fn next_run_after(now: DateTime<Utc>, tz: &Tz, train_hour: u32) -> DateTime<Utc> {
    let hour = train_hour.min(23);
    let mut day = now.with_timezone(tz).date_naive();

    loop {
        for h in hour..24 {
            let Some(time) = NaiveTime::from_hms_opt(h, 0, 0) else {
                continue;
            };
            if let Some(local) = tz.from_local_datetime(&day.and_time(time)).earliest() {
                let candidate = local.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
                break;
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => return now + Duration::days(1),
        };
    }
}

/// Fetch `history_days` of history and train on it.
///
/// Training itself runs on the blocking pool. A pass already in progress
/// makes this return `TrainingInProgress` instead of queueing.
pub async fn train_from_source(
    engine: Arc<Engine>,
    source: &dyn HistorySource,
    config: &MiningConfig,
) -> Result<TrainingSummary, EngineError> {
    let config = config.clamped();
    let end = Utc::now();
    let start = end - Duration::days(config.history_days as i64);

    tracing::info!(
        "Fetching {} days of history from {}",
        config.history_days,
        source.name()
    );
    let records = source.fetch_history(start, end).await?;

    tokio::task::spawn_blocking(move || engine.try_train(&records, &config))
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?
}

/// Retrain every night at `train_hour` local time. Never returns.
pub async fn run_nightly(
    engine: Arc<Engine>,
    source: Arc<dyn HistorySource>,
    mining: MiningConfig,
    train_hour: u32,
) {
    let tz = mining.time_zone();
    loop {
        let now = Utc::now();
        let next = next_run_after(now, &tz, train_hour);
        tracing::info!("Next scheduled training at {}", next.with_timezone(&tz));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match train_from_source(engine.clone(), source.as_ref(), &mining).await {
            Ok(summary) => tracing::info!(
                "Scheduled training finished: {} transitions",
                summary.counts.transitions
            ),
            Err(EngineError::TrainingInProgress) => {
                tracing::warn!("Skipping scheduled training: another pass is running")
            }
            Err(e) => tracing::error!("Scheduled training failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::StateRecord;
    use crate::source::MockHistorySource;

    #[test]
    fn test_next_run_same_day_and_next_day() {
        let tz = Tz::UTC;
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        assert_eq!(
            next_run_after(early, &tz, 3),
            Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap()
        );

        let late = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(
            next_run_after(late, &tz, 3),
            Utc.with_ymd_and_hms(2024, 3, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_uses_local_zone() {
        let tz: Tz = "Europe/Moscow".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        // 03:00 MSK is 00:00 UTC
        assert_eq!(
            next_run_after(now, &tz, 3),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_skips_dst_gap() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 2024-03-31 02:00 local does not exist in Berlin
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 23, 0, 0).unwrap();
        let next = next_run_after(now, &tz, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_train_from_source_trains_engine() {
        let mut source = MockHistorySource::new();
        source.expect_name().return_const("mock".to_string());
        source
            .expect_fetch_history()
            .withf(|start, end| (*end - *start).num_days() == 14)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    StateRecord::new("light.a", "off", "2024-01-01T07:00:00Z"),
                    StateRecord::new("light.a", "on", "2024-01-01T08:00:00Z"),
                ])
            });

        let engine = Arc::new(Engine::new());
        let summary = train_from_source(engine.clone(), &source, &MiningConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.counts.transitions, 1);
        assert!(engine.is_trained());
    }

    #[tokio::test]
    async fn test_source_failure_leaves_engine_untrained() {
        let mut source = MockHistorySource::new();
        source.expect_name().return_const("mock".to_string());
        source.expect_fetch_history().returning(|_, _| {
            Err(EngineError::HistorySource {
                message: "503".into(),
                retriable: true,
            })
        });

        let engine = Arc::new(Engine::new());
        let err = train_from_source(engine.clone(), &source, &MiningConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert!(!engine.is_trained());
    }
}
