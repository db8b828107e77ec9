// src/cli/train.rs — One-off training from a file or Home Assistant

use std::path::Path;

use crate::engine::TrainingSummary;
use crate::infra::config::Config;
use crate::infra::scheduler;
use crate::source::{parse_history_json, HomeAssistantSource};

/// Train and persist a new model. A corrupt stored model does not block
/// this; it gets replaced.
pub async fn run_train(config: &Config, input: Option<&Path>) -> anyhow::Result<()> {
    let engine = super::open_engine_or_untrained(config);

    let summary = match input {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let records = parse_history_json(&raw)?;
            let mining = config.mining.clone();
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || engine.train(&records, &mining)).await??
        }
        None => {
            let source = HomeAssistantSource::new(&config.home_assistant)?;
            scheduler::train_from_source(engine.clone(), &source, &config.mining).await?
        }
    };

    print_summary(&summary);
    if !summary.persisted && engine.is_trained() {
        eprintln!("warning: model was not persisted; check [storage] in the config");
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    let c = &summary.counts;
    println!("Trained at {}", summary.trained_at.to_rfc3339());
    if let Some(window) = &summary.window {
        println!("  Window:       {} .. {}", window.start, window.end);
    }
    println!(
        "  Records:      {} ({} accepted, {} skipped, {} filtered)",
        c.records, c.accepted, c.skipped_count, c.filtered
    );
    println!(
        "  Transitions:  {} across {} entities in {} domains",
        c.transitions, c.entities, c.domains
    );
    println!(
        "  Patterns:     {} slots, {} routine chains, {} sequence rules",
        c.slots, c.routine_chains, c.sequence_rules
    );
    println!("  Took {}ms", summary.duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::StorageBackend;
    use crate::storage::{JsonFileStore, ModelStore};

    #[tokio::test]
    async fn test_train_replaces_corrupt_stored_model() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        std::fs::write(&model_path, "{corrupt").unwrap();

        let input = dir.path().join("history.json");
        std::fs::write(
            &input,
            r#"[
                {"entity_id": "light.desk", "state": "off", "last_changed": "2024-01-01T07:00:00Z"},
                {"entity_id": "light.desk", "state": "on", "last_changed": "2024-01-01T08:00:00Z"}
            ]"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.storage.backend = StorageBackend::Json;
        config.storage.path = Some(model_path.display().to_string());

        run_train(&config, Some(&input)).await.unwrap();

        let stored = JsonFileStore::new(&model_path).load().unwrap().unwrap();
        assert_eq!(stored.metadata.counts.transitions, 1);
    }
}
