use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{self, AuthError, Claims, TokenKind};
use crate::database::models::user::Principal;
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated request context injected by the gate. Carries the raw
/// credential so downstream handlers can digest it (logout, shifting).
#[derive(Clone, Debug)]
pub struct AuthPrincipal {
    pub principal: Principal,
    pub claims: Claims,
    pub token: String,
}

/// Access gate for everything under /api. Bearer extraction, decode,
/// blacklist check, session liveness check, then principal injection.
/// Every failure collapses to the same low-detail 401; the specific cause
/// is logged, not returned.
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers)?;

    let claims = auth::decode_jwt_expecting(&token, TokenKind::Access)?;

    let digest = auth::token_digest(&token);
    if state.store.is_blacklisted(&digest).await? {
        return Err(AuthError::Revoked.into());
    }

    if !state.store.session_active(claims.sub, &digest, chrono::Utc::now()).await? {
        return Err(AuthError::SessionInactive.into());
    }

    let principal = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| {
            debug!(user_id = %claims.sub, "Token for unknown or deactivated principal");
            ApiError::unauthorized("Invalid token")
        })?;

    request.extensions_mut().insert(AuthPrincipal {
        principal,
        claims,
        token,
    });

    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
        _ => Err(ApiError::unauthorized("Authorization header must use Bearer token format")),
    }
}

/// Client metadata captured for session and shift records
pub fn client_meta(headers: &HeaderMap) -> (Option<String>, String) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    (ip, user_agent)
}
