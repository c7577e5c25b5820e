use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, AuthError, Claims, ServiceName};
use crate::config;
use crate::database::models::token_shift::TokenShift;
use crate::database::models::user::Principal;
use crate::error::ApiError;
use crate::store::Store;

/// Body of POST /api/shifting/request
#[derive(Debug, Deserialize)]
pub struct ShiftRequest {
    pub target_service: String,
    pub expires_in: Option<i64>,
    pub reason: Option<String>,
}

/// A freshly minted shift: the persisted record plus the raw credential,
/// which is returned to the caller exactly once
#[derive(Debug)]
pub struct ShiftOutcome {
    pub record: TokenShift,
    pub new_token: String,
}

/// Coordinates credential relays between services. Every shift mints a fresh
/// credential scoped to one target service; the record keeps a redacted copy
/// of the original so nothing stored can be replayed.
pub struct ShiftService {
    store: Arc<dyn Store>,
}

impl ShiftService {
    /// Shifts initiated over the public API always originate here
    pub const SOURCE: ServiceName = ServiceName::ApiGateway;

    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn request_shift(
        &self,
        principal: &Principal,
        presented_token: &str,
        presented_claims: &Claims,
        request: ShiftRequest,
        ip_address: Option<String>,
        user_agent: &str,
    ) -> Result<ShiftOutcome, ApiError> {
        let target = ServiceName::parse(&request.target_service).ok_or_else(|| {
            ApiError::field_error(
                "target_service",
                format!(
                    "'{}' is not a valid service. Valid choices: {}",
                    request.target_service,
                    ServiceName::valid_choices()
                ),
            )
        })?;

        if target == Self::SOURCE {
            return Err(ApiError::field_error(
                "target_service",
                "Target service must differ from the source service",
            ));
        }

        let security = &config::config().security;
        let expires_in = request.expires_in.unwrap_or(security.shift_default_ttl_secs);
        if expires_in < security.shift_min_ttl_secs || expires_in > security.shift_max_ttl_secs {
            return Err(ApiError::field_error(
                "expires_in",
                format!(
                    "expires_in must be between {} and {} seconds",
                    security.shift_min_ttl_secs, security.shift_max_ttl_secs
                ),
            ));
        }

        let ttl = Duration::seconds(expires_in);

        // Fresh mint: same principal, scoped to the target, own TTL
        let claims = Claims::new(
            principal.id,
            principal.username.clone(),
            principal.role,
            principal.tenant_id.clone(),
            presented_claims.token_use,
            ttl,
        )
        .shifted(target);
        let new_token = auth::generate_jwt(&claims)?;

        let record = TokenShift {
            id: Uuid::new_v4(),
            user_id: principal.id,
            original_token: auth::redact_token(presented_token),
            shifted_token: new_token.clone(),
            source_service: Self::SOURCE,
            target_service: target,
            shift_reason: request.reason.unwrap_or_default(),
            token_type: presented_claims.token_use,
            expires_at: Utc::now() + ttl,
            is_active: true,
            shifted_at: Utc::now(),
            last_used: None,
            usage_count: 0,
            ip_address,
            user_agent: user_agent.to_string(),
        };

        let record = self.store.insert_shift(record).await?;
        info!(
            user_id = %principal.id,
            shift_id = %record.id,
            target_service = %target,
            "Token shifted"
        );
        Ok(ShiftOutcome { record, new_token })
    }

    /// Shift history, most recent first, annotated with computed expiry
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<serde_json::Value>, ApiError> {
        let shifts = self.store.list_shifts(user_id).await?;
        Ok(shifts.iter().map(TokenShift::history_entry).collect())
    }

    /// Deactivate one shift. Repeating the call reports the record as
    /// absent; revocation never reactivates or resets anything.
    pub async fn revoke(&self, user_id: Uuid, shift_id: Uuid) -> Result<TokenShift, ApiError> {
        let record = self.store.revoke_shift(user_id, shift_id).await?;
        info!(user_id = %user_id, shift_id = %shift_id, "Token shift revoked");
        Ok(record)
    }

    /// Consumer-side check: decode a shifted credential and verify it is
    /// scoped to the expected service and not revoked. Unlike the access
    /// gate, failure causes here are specific.
    pub async fn validate_incoming(
        &self,
        token: &str,
        expected_service: ServiceName,
    ) -> Result<Claims, AuthError> {
        let claims = auth::decode_jwt(token)?;

        match claims.service {
            None => return Err(AuthError::MissingService),
            Some(service) if service != expected_service => {
                return Err(AuthError::WrongService {
                    expected: expected_service.to_string(),
                    found: service.to_string(),
                })
            }
            Some(_) => {}
        }

        // A known record must still be active; unknown tokens pass on the
        // signature alone (the consumer may not share our store)
        if let Ok(Some(record)) = self.store.find_shift_by_token(token).await {
            if !record.is_active {
                return Err(AuthError::Revoked);
            }
            let _ = self.store.touch_shift(record.id, Utc::now()).await;
        }

        Ok(claims)
    }
}
