// src/api/auth.rs — Optional bearer-token check

use crate::api::{handlers::ApiError, types::ErrorResponse, ApiState};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;

/// Verify the bearer token if one is configured. A blank token disables
/// the check.
pub fn check_auth(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Ok(());
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Ok(());
    }

    tracing::debug!("Rejected request with missing or wrong bearer token");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Invalid or missing bearer token".into(),
            retriable: false,
        }),
    ))
}

/// Byte comparison whose running time does not depend on where the
/// inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
