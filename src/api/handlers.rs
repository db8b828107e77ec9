// src/api/handlers.rs

use crate::api::{auth, types::*, ApiState};
use crate::engine::{ModelMetadata, TrainingSummary};
use crate::infra::config::MiningConfig;
use crate::infra::errors::EngineError;
use crate::infra::scheduler;
use crate::mining::extractor::parse_timestamp;
use crate::mining::{RoutineSuggestion, SequenceSuggestion, TimeSlotKey};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            retriable: false,
        }),
    )
}

/// Map engine failures onto HTTP statuses.
pub fn error_response(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::NotTrained | EngineError::TrainingInProgress => StatusCode::CONFLICT,
        EngineError::HistorySource { .. } => StatusCode::BAD_GATEWAY,
        EngineError::Serialization(_)
        | EngineError::Database(_)
        | EngineError::Io(_)
        | EngineError::Config(_)
        | EngineError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            retriable: err.is_retriable(),
            error: err.to_string(),
        }),
    )
}

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        trained: state.engine.is_trained(),
        training: state.engine.progress(),
    })
}

/// POST /api/v1/train: train from posted records or the history source.
pub async fn train(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<TrainRequest>,
) -> Result<Json<TrainingSummary>, ApiError> {
    auth::check_auth(&state, &headers)?;

    let summary = match body.records {
        Some(records) => {
            let engine = state.engine.clone();
            let mining = state.mining.as_ref().clone();
            tokio::task::spawn_blocking(move || engine.try_train(&records, &mining))
                .await
                .map_err(|e| error_response(EngineError::Task(e.to_string())))?
        }
        None => {
            let Some(source) = state.source.clone() else {
                return Err(bad_request(
                    "No records in request and no history source configured",
                ));
            };
            scheduler::train_from_source(state.engine.clone(), source.as_ref(), &state.mining)
                .await
        }
    }
    .map_err(error_response)?;

    Ok(Json(summary))
}

/// POST /api/v1/predict
pub async fn predict(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    auth::check_auth(&state, &headers)?;

    let model = state.engine.snapshot().ok_or_else(|| error_response(EngineError::NotTrained))?;
    let tz = model.time_zone();

    let at = match body.at.as_deref() {
        Some(raw) => parse_timestamp(raw, &tz)
            .ok_or_else(|| bad_request(format!("Unparseable timestamp '{raw}'")))?,
        None => Utc::now(),
    };

    let mut mining: MiningConfig = state.mining.as_ref().clone();
    if let Some(limit) = body.limit {
        mining.prediction_limit = limit;
    }

    Ok(Json(PredictResponse {
        at,
        slot: TimeSlotKey::of(&at, &tz),
        predictions: model.predict(at, &mining),
    }))
}

/// GET /api/v1/routines
pub async fn routines(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SuggestionList<RoutineSuggestion>>, ApiError> {
    auth::check_auth(&state, &headers)?;
    let items = state
        .engine
        .routine_suggestions(&state.mining)
        .map_err(error_response)?;
    Ok(Json(items.into()))
}

/// GET /api/v1/sequences
pub async fn sequences(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SuggestionList<SequenceSuggestion>>, ApiError> {
    auth::check_auth(&state, &headers)?;
    let items = state
        .engine
        .sequence_suggestions(&state.mining)
        .map_err(error_response)?;
    Ok(Json(items.into()))
}

/// GET /api/v1/info
pub async fn info(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ModelMetadata>, ApiError> {
    auth::check_auth(&state, &headers)?;
    state.engine.info().map(Json).map_err(error_response)
}

/// GET /api/v1/config: effective (clamped) mining configuration.
pub async fn config(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<MiningConfig>, ApiError> {
    auth::check_auth(&state, &headers)?;
    Ok(Json(state.mining.clamped()))
}
