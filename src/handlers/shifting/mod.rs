use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::ServiceName;
use crate::error::ApiError;
use crate::middleware::auth::{client_meta, AuthPrincipal};
use crate::services::ShiftRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
    pub expected_service: String,
}

/// POST /api/shifting/request - mint a credential scoped to another service
pub async fn request_shift(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
    headers: HeaderMap,
    Json(body): Json<ShiftRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (ip, user_agent) = client_meta(&headers);

    let outcome = state
        .shifts()
        .request_shift(&auth.principal, &auth.token, &auth.claims, body, ip, &user_agent)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Token shifted successfully",
            "shift_id": outcome.record.id,
            "new_token": outcome.new_token,
            "source_service": outcome.record.source_service,
            "target_service": outcome.record.target_service,
            "token_type": outcome.record.token_type,
            "expires_at": outcome.record.expires_at,
        })),
    ))
}

/// GET /api/shifting/history - the caller's shifts, most recent first
pub async fn history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
) -> Result<Json<Value>, ApiError> {
    let shifts = state.shifts().history(auth.principal.id).await?;
    Ok(Json(json!({
        "count": shifts.len(),
        "shifts": shifts,
    })))
}

/// POST /api/shifting/:id/revoke - revoking twice reports the record absent
pub async fn revoke(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
    Path(shift_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let record = state.shifts().revoke(auth.principal.id, shift_id).await?;
    Ok(Json(json!({
        "message": "Token shift revoked successfully",
        "shift_id": record.id,
        "target_service": record.target_service,
    })))
}

/// POST /api/shifting/validate - consumer-side check of a shifted
/// credential. Unlike the access gate, the failure cause is returned.
pub async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<Value>, ApiError> {
    let expected = ServiceName::parse(&body.expected_service).ok_or_else(|| {
        ApiError::field_error(
            "expected_service",
            format!(
                "'{}' is not a valid service. Valid choices: {}",
                body.expected_service,
                ServiceName::valid_choices()
            ),
        )
    })?;

    let claims = state
        .shifts()
        .validate_incoming(&body.token, expected)
        .await
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    Ok(Json(json!({
        "valid": true,
        "user_id": claims.sub,
        "username": claims.username,
        "role": claims.role,
        "service": claims.service,
        "expires_at": claims.exp,
    })))
}
