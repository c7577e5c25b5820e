use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::models::session::Session;
use crate::database::models::token_shift::TokenShift;
use crate::database::models::user::Principal;

use super::{AuthStore, StoreError, UserStore};

/// In-memory store used when no DATABASE_URL is configured and by the test
/// suite. Same visibility rules as the Postgres backing: reads are scoped by
/// principal id, soft deletes only.
#[derive(Default)]
pub struct MemoryAuthStore {
    users: RwLock<HashMap<Uuid, Principal>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    shifts: RwLock<HashMap<Uuid, TokenShift>>,
    blacklist: RwLock<HashSet<String>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryAuthStore {
    async fn insert_user(&self, user: &Principal) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Conflict("username or email already registered".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn user_identity_taken(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.username == username || u.email == email))
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
        user.password_hash = hash.to_string();
        Ok(())
    }

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
        user.last_login = Some(at);
        Ok(())
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn upsert_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        // Upsert keyed by (user_id, session_token); keep the original row id
        let existing_id = sessions
            .values()
            .find(|s| s.user_id == session.user_id && s.session_token == session.session_token)
            .map(|s| s.id);

        let mut row = session;
        if let Some(id) = existing_id {
            row.id = id;
        }
        sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn close_session(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.session_token == token_digest {
                session.is_active = false;
                session.expires_at = now;
            }
        }
        Ok(())
    }

    async fn close_all_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut closed = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                session.expires_at = now;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active && s.expires_at > now)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rows)
    }

    async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.user_id == user_id => {
                session.is_active = false;
                session.expires_at = now;
                Ok(())
            }
            // Foreign sessions are indistinguishable from absent ones
            _ => Err(StoreError::NotFound("Session not found".to_string())),
        }
    }

    async fn session_active(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().any(|s| {
            s.user_id == user_id
                && s.session_token == token_digest
                && s.is_active
                && s.expires_at > now
        }))
    }

    async fn insert_shift(&self, shift: TokenShift) -> Result<TokenShift, StoreError> {
        let mut shifts = self.shifts.write().await;
        shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn list_shifts(&self, user_id: Uuid) -> Result<Vec<TokenShift>, StoreError> {
        let shifts = self.shifts.read().await;
        let mut rows: Vec<TokenShift> = shifts
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.shifted_at.cmp(&a.shifted_at));
        Ok(rows)
    }

    async fn revoke_shift(&self, user_id: Uuid, shift_id: Uuid) -> Result<TokenShift, StoreError> {
        let mut shifts = self.shifts.write().await;
        match shifts.get_mut(&shift_id) {
            Some(shift) if shift.user_id == user_id && shift.is_active => {
                shift.is_active = false;
                Ok(shift.clone())
            }
            // Already-revoked rows fall through: the caller's view is stale
            _ => Err(StoreError::NotFound(
                "Token shift record not found or already revoked".to_string(),
            )),
        }
    }

    async fn find_shift_by_token(&self, shifted_token: &str) -> Result<Option<TokenShift>, StoreError> {
        let shifts = self.shifts.read().await;
        Ok(shifts.values().find(|s| s.shifted_token == shifted_token).cloned())
    }

    async fn touch_shift(&self, shift_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut shifts = self.shifts.write().await;
        if let Some(shift) = shifts.get_mut(&shift_id) {
            shift.usage_count += 1;
            shift.last_used = Some(now);
        }
        Ok(())
    }

    async fn blacklist_token(
        &self,
        token_digest: &str,
        _user_id: Uuid,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.blacklist.write().await.insert(token_digest.to_string());
        Ok(())
    }

    async fn is_blacklisted(&self, token_digest: &str) -> Result<bool, StoreError> {
        Ok(self.blacklist.read().await.contains(token_digest))
    }
}
