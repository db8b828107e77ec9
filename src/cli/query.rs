// src/cli/query.rs — Read-only commands against the stored model

use chrono::Utc;

use crate::infra::config::Config;
use crate::infra::errors::EngineError;
use crate::mining::extractor::parse_timestamp;
use crate::mining::TimeSlotKey;

pub fn run_predict(
    config: &Config,
    at: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = super::open_engine(config)?;
    let model = engine.snapshot().ok_or(EngineError::NotTrained)?;
    let tz = model.time_zone();

    let at = match at {
        Some(raw) => parse_timestamp(raw, &tz)
            .ok_or_else(|| EngineError::InvalidInput(format!("unparseable timestamp '{raw}'")))?,
        None => Utc::now(),
    };
    let mut mining = config.mining.clone();
    if let Some(limit) = limit {
        mining.prediction_limit = limit;
    }
    let predictions = model.predict(at, &mining);

    if json {
        println!("{}", serde_json::to_string_pretty(&predictions)?);
        return Ok(());
    }

    println!(
        "Predictions for {} (slot {})",
        at.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z"),
        TimeSlotKey::of(&at, &tz)
    );
    if predictions.is_empty() {
        println!("  (none)");
    }
    for p in &predictions {
        println!(
            "  {:<40} -> {:<12} {:>5.2}  {:>3} days  [{}]",
            p.entity_id,
            p.state,
            p.confidence,
            p.support,
            p.source.as_str()
        );
    }
    Ok(())
}

pub fn run_routines(config: &Config, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(config)?;
    let routines = engine.routine_suggestions(&config.mining)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&routines)?);
        return Ok(());
    }
    if routines.is_empty() {
        println!("No routines met the thresholds.");
    }
    for r in &routines {
        println!(
            "{} ({:.0}% of {} arrival days, typically {})",
            r.title,
            r.confidence * 100.0,
            r.arrival_days,
            r.typical_arrival_time.as_deref().unwrap_or("?")
        );
        println!("{}", r.automation_yaml);
    }
    Ok(())
}

pub fn run_sequences(config: &Config, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(config)?;
    let sequences = engine.sequence_suggestions(&config.mining)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sequences)?);
        return Ok(());
    }
    if sequences.is_empty() {
        println!("No sequences met the thresholds.");
    }
    for s in &sequences {
        println!(
            "{} ({:.0}%, {} of {} days, within {} min)",
            s.title,
            s.confidence * 100.0,
            s.support,
            s.antecedent_days,
            s.window_minutes
        );
        println!("{}", s.automation_yaml);
    }
    Ok(())
}

pub fn run_info(config: &Config) -> anyhow::Result<()> {
    let engine = super::open_engine(config)?;
    let info = engine.info()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
