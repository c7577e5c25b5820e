use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{self, Claims, TokenKind};
use crate::config;
use crate::database::models::user::Principal;
use crate::error::ApiError;
use crate::store::Store;

/// Access/refresh pair as handed to clients. `expires_in` is the access
/// token's remaining lifetime in seconds.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Issues, rotates and blacklists credentials. Password hashing lives here
/// too so handlers never touch argon2 directly.
pub struct CredentialService {
    store: Arc<dyn Store>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn hash_password(raw: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| {
                warn!("Password hashing failed: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            })
    }

    pub fn verify_password(raw: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(raw.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Mint a fresh access/refresh pair for a principal
    pub fn issue_pair(principal: &Principal) -> Result<TokenPair, ApiError> {
        let security = &config::config().security;
        let access_ttl = Duration::minutes(security.access_token_ttl_mins);
        let refresh_ttl = Duration::hours(security.refresh_token_ttl_hours);

        let access = auth::generate_jwt(&Claims::new(
            principal.id,
            principal.username.clone(),
            principal.role,
            principal.tenant_id.clone(),
            TokenKind::Access,
            access_ttl,
        ))?;

        let refresh = auth::generate_jwt(&Claims::new(
            principal.id,
            principal.username.clone(),
            principal.role,
            principal.tenant_id.clone(),
            TokenKind::Refresh,
            refresh_ttl,
        ))?;

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            token_type: "Bearer",
            expires_in: access_ttl.num_seconds(),
        })
    }

    /// Exchange a refresh token for a new pair. The presented refresh token
    /// is blacklisted so it cannot be replayed.
    pub async fn rotate_on_refresh(&self, refresh_token: &str) -> Result<(Principal, TokenPair), ApiError> {
        let claims = auth::decode_jwt_expecting(refresh_token, TokenKind::Refresh)?;

        let digest = auth::token_digest(refresh_token);
        if self.store.is_blacklisted(&digest).await? {
            return Err(crate::auth::AuthError::Revoked.into());
        }

        let principal = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

        // Single-use: the old refresh token dies with the exchange
        self.store.blacklist_token(&digest, principal.id, Utc::now()).await?;

        let pair = Self::issue_pair(&principal)?;
        info!(user_id = %principal.id, "Rotated refresh token");
        Ok((principal, pair))
    }

    /// Blacklist a refresh token at logout. Malformed input is reported with
    /// the same generic message as every other credential failure.
    pub async fn blacklist_refresh(&self, refresh_token: &str, user_id: uuid::Uuid) -> Result<(), ApiError> {
        auth::decode_jwt_expecting(refresh_token, TokenKind::Refresh)?;
        let digest = auth::token_digest(refresh_token);
        self.store.blacklist_token(&digest, user_id, Utc::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::user::Role;
    use crate::store::MemoryAuthStore;
    use crate::store::UserStore;
    use uuid::Uuid;

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: CredentialService::hash_password("hunter2!").unwrap(),
            role: Role::Shipper,
            tenant_id: Some("acme-1a2b".to_string()),
            company_name: None,
            phone: None,
            is_verified: true,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = CredentialService::hash_password("s3cret-pw").unwrap();
        assert!(CredentialService::verify_password("s3cret-pw", &hash));
        assert!(!CredentialService::verify_password("wrong", &hash));
        assert!(!CredentialService::verify_password("s3cret-pw", "not-a-hash"));
    }

    #[test]
    fn issued_pair_has_distinct_kinds() {
        let pair = CredentialService::issue_pair(&principal()).unwrap();
        let access = auth::decode_jwt(&pair.access_token).unwrap();
        let refresh = auth::decode_jwt(&pair.refresh_token).unwrap();
        assert_eq!(access.token_use, TokenKind::Access);
        assert_eq!(refresh.token_use, TokenKind::Refresh);
        assert_eq!(pair.expires_in, 3600);
    }

    #[tokio::test]
    async fn refresh_rotation_is_single_use() {
        let store = Arc::new(MemoryAuthStore::new());
        let user = principal();
        store.insert_user(&user).await.unwrap();

        let service = CredentialService::new(store);
        let pair = CredentialService::issue_pair(&user).unwrap();

        let (who, _new_pair) = service.rotate_on_refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(who.id, user.id);

        // Second exchange with the same token must fail
        let err = service.rotate_on_refresh(&pair.refresh_token).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let store = Arc::new(MemoryAuthStore::new());
        let user = principal();
        store.insert_user(&user).await.unwrap();

        let service = CredentialService::new(store);
        let pair = CredentialService::issue_pair(&user).unwrap();
        let err = service.rotate_on_refresh(&pair.access_token).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
