use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::token_digest;
use crate::config;
use crate::database::models::session::{DeviceInfo, Session};
use crate::database::models::user::Principal;
use crate::error::ApiError;
use crate::store::Store;

/// Session bookkeeping over the store seam. Sessions are keyed by the
/// digest of the issued access credential, so re-login with the same
/// credential updates the existing row instead of duplicating it.
pub struct SessionService {
    store: Arc<dyn Store>,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open (or refresh) a session for a freshly issued access credential
    pub async fn open(
        &self,
        principal: &Principal,
        access_token: &str,
        ip_address: Option<String>,
        user_agent: &str,
    ) -> Result<Session, ApiError> {
        let now = Utc::now();
        let ttl = Duration::hours(config::config().security.session_ttl_hours);

        let session = Session {
            id: Uuid::new_v4(),
            user_id: principal.id,
            session_token: token_digest(access_token),
            device_info: DeviceInfo::from_user_agent(user_agent),
            ip_address,
            user_agent: user_agent.to_string(),
            login_at: now,
            last_activity: now,
            expires_at: now + ttl,
            is_active: true,
        };

        let session = self.store.upsert_session(session).await?;
        info!(user_id = %principal.id, session_id = %session.id, "Session opened");
        Ok(session)
    }

    /// Close the session backing the presented credential (logout)
    pub async fn close(&self, user_id: Uuid, access_token: &str) -> Result<(), ApiError> {
        self.store
            .close_session(user_id, &token_digest(access_token), Utc::now())
            .await?;
        Ok(())
    }

    /// Close every active session (password-change blast radius); returns
    /// the count closed
    pub async fn close_all(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let closed = self.store.close_all_sessions(user_id, Utc::now()).await?;
        info!(user_id = %user_id, closed, "Closed all sessions");
        Ok(closed)
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>, ApiError> {
        Ok(self.store.list_active_sessions(user_id, Utc::now()).await?)
    }

    /// Revoke one session by id. Sessions owned by other principals are
    /// reported as absent.
    pub async fn revoke(&self, user_id: Uuid, session_id: Uuid) -> Result<(), ApiError> {
        self.store.revoke_session(user_id, session_id, Utc::now()).await?;
        info!(user_id = %user_id, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Gate check: does the presented credential still back a live session?
    pub async fn is_credential_live(&self, user_id: Uuid, access_token: &str) -> Result<bool, ApiError> {
        Ok(self
            .store
            .session_active(user_id, &token_digest(access_token), Utc::now())
            .await?)
    }
}
