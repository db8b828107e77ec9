// src/infra/errors.rs — Error types for habitual

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // Caller errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model not trained yet. Run a training pass first.")]
    NotTrained,

    #[error("Training already in progress")]
    TrainingInProgress,

    // Persistence
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Collaborators
    #[error("History source error: {message}")]
    HistorySource { message: String, retriable: bool },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<serde_yml::Error> for EngineError {
    fn from(e: serde_yml::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl EngineError {
    /// Whether a caller may reasonably try the same operation again later.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngineError::TrainingInProgress
                | EngineError::HistorySource {
                    retriable: true,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(EngineError::TrainingInProgress.is_retriable());
        assert!(EngineError::HistorySource {
            message: "502".into(),
            retriable: true
        }
        .is_retriable());
        assert!(!EngineError::NotTrained.is_retriable());
        assert!(!EngineError::InvalidInput("x".into()).is_retriable());
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: EngineError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
