use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::session::Session;
use crate::database::models::token_shift::TokenShift;
use crate::database::models::user::Principal;

pub mod memory;
pub mod postgres;

pub use memory::MemoryAuthStore;
pub use postgres::PgAuthStore;

/// Convenience bound for backings that implement both seams
pub trait Store: UserStore + AuthStore {}

impl<T: UserStore + AuthStore> Store for T {}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence seam for principals. Users live in the system partition
/// regardless of tenant scope.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &Principal) -> Result<(), StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError>;

    /// True if either identifier is already registered
    async fn user_identity_taken(&self, username: &str, email: &str) -> Result<bool, StoreError>;

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError>;

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Persistence seam for sessions, token shifts and the refresh blacklist.
/// Every read is scoped by the owning principal's id; cross-tenant rows are
/// invisible at the query level, not filtered after the fact.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // --- sessions ---

    /// Upsert keyed by (user_id, session_token digest). Last write wins.
    async fn upsert_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Deactivate the session matching the presented credential digest.
    /// Silent when no row matches (logout with an unknown token).
    async fn close_session(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deactivate every active session for a principal; returns count closed
    async fn close_all_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Sessions with is_active=true and expires_at in the future, most
    /// recent activity first
    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    /// NotFound when the session is absent or owned by another principal
    async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// True when an active, unexpired session exists for this credential
    async fn session_active(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // --- token shifts ---

    async fn insert_shift(&self, shift: TokenShift) -> Result<TokenShift, StoreError>;

    /// All shift records for a principal, most recent first
    async fn list_shifts(&self, user_id: Uuid) -> Result<Vec<TokenShift>, StoreError>;

    /// Deactivates a shift record. Only rows with is_active=true match, so a
    /// second revocation reports NotFound rather than succeeding again.
    async fn revoke_shift(&self, user_id: Uuid, shift_id: Uuid) -> Result<TokenShift, StoreError>;

    async fn find_shift_by_token(&self, shifted_token: &str) -> Result<Option<TokenShift>, StoreError>;

    /// Atomic usage bump: usage_count + 1, last_used = now
    async fn touch_shift(&self, shift_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    // --- refresh blacklist ---

    async fn blacklist_token(
        &self,
        token_digest: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn is_blacklisted(&self, token_digest: &str) -> Result<bool, StoreError>;
}
