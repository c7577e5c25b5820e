use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::database::models::user::{Principal, Role};
use crate::error::ApiError;
use crate::middleware::auth::{client_meta, AuthPrincipal};
use crate::services::CredentialService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /auth/register - create a principal and its tenant scope
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let username = body.username.trim();
    if username.len() < 3 {
        return Err(ApiError::field_error("username", "Username must be at least 3 characters"));
    }
    if !body.email.contains('@') {
        return Err(ApiError::field_error("email", "Enter a valid email address"));
    }
    if body.password.len() < 8 {
        return Err(ApiError::field_error("password", "Password must be at least 8 characters"));
    }

    let role = match body.role.as_deref() {
        None => Role::default(),
        Some(value) => Role::parse(value).ok_or_else(|| {
            ApiError::field_error("role", format!("'{}' is not a valid role", value))
        })?,
    };

    if state.store.user_identity_taken(username, &body.email).await? {
        return Err(ApiError::conflict("username or email already registered"));
    }

    let user = Principal {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: body.email.clone(),
        password_hash: CredentialService::hash_password(&body.password)?,
        role,
        tenant_id: Some(new_tenant_id(username)),
        company_name: body.company_name,
        phone: body.phone,
        is_verified: false,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
    };

    state.store.insert_user(&user).await?;
    info!(user_id = %user.id, username = %user.username, "Registered user");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": user.profile(),
        })),
    ))
}

/// Tenant scope for a fresh registration: username plus a random suffix,
/// kept compatible with partition naming rules
fn new_tenant_id(username: &str) -> String {
    let slug: String = username
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &suffix[..8])
}

/// POST /auth/login - verify credentials, issue a pair, open a session
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .store
        .find_user_by_username(body.username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !CredentialService::verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let pair = CredentialService::issue_pair(&user)?;

    let (ip, user_agent) = client_meta(&headers);
    state.sessions().open(&user, &pair.access_token, ip, &user_agent).await?;
    state.store.set_last_login(user.id, Utc::now()).await?;

    info!(user_id = %user.id, "Login");
    Ok(Json(json!({
        "message": "Login successful",
        "user": user.profile(),
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
        "token_type": pair.token_type,
        "expires_in": pair.expires_in,
    })))
}

/// POST /auth/token/refresh - exchange a refresh token for a new pair.
/// The old refresh token is blacklisted and the new access credential gets
/// its own session row.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let (user, pair) = state.credentials().rotate_on_refresh(&body.refresh_token).await?;

    let (ip, user_agent) = client_meta(&headers);
    state.sessions().open(&user, &pair.access_token, ip, &user_agent).await?;

    Ok(Json(json!({
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
        "token_type": pair.token_type,
        "expires_in": pair.expires_in,
    })))
}

/// POST /api/auth/logout - close the presenting session; a supplied refresh
/// token is blacklisted so the pair dies together
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<Value>, ApiError> {
    state.sessions().close(auth.principal.id, &auth.token).await?;

    if let Some(Json(body)) = body {
        if let Some(refresh_token) = body.refresh_token {
            state
                .credentials()
                .blacklist_refresh(&refresh_token, auth.principal.id)
                .await?;
        }
    }

    info!(user_id = %auth.principal.id, "Logout");
    Ok(Json(json!({ "message": "Logout successful" })))
}

/// GET /api/auth/profile
pub async fn profile(Extension(auth): Extension<AuthPrincipal>) -> Json<Value> {
    Json(auth.principal.profile())
}

/// POST /api/auth/change-password - every existing session is closed,
/// including the one making this request; a fresh pair is issued so the
/// caller alone stays authenticated
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    if !CredentialService::verify_password(&body.current_password, &auth.principal.password_hash) {
        return Err(ApiError::field_error("current_password", "Current password is incorrect"));
    }
    if body.new_password.len() < 8 {
        return Err(ApiError::field_error("new_password", "Password must be at least 8 characters"));
    }

    let hash = CredentialService::hash_password(&body.new_password)?;
    state.store.set_password_hash(auth.principal.id, &hash).await?;

    let closed = state.sessions().close_all(auth.principal.id).await?;

    let pair = CredentialService::issue_pair(&auth.principal)?;
    let (ip, user_agent) = client_meta(&headers);
    state.sessions().open(&auth.principal, &pair.access_token, ip, &user_agent).await?;

    info!(user_id = %auth.principal.id, closed, "Password changed");

    Ok(Json(json!({
        "message": "Password changed successfully",
        "sessions_closed": closed,
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
        "token_type": pair.token_type,
        "expires_in": pair.expires_in,
    })))
}

/// GET /api/auth/sessions - active sessions for the calling principal
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.sessions().list_active(auth.principal.id).await?;
    Ok(Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

/// POST /api/auth/sessions/:id/revoke - sessions of other principals are
/// reported as absent, not forbidden
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPrincipal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.sessions().revoke(auth.principal.id, session_id).await?;
    Ok(Json(json!({
        "message": "Session revoked",
        "session_id": session_id,
    })))
}
