use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::auth::{ServiceName, TokenKind};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::session::Session;
use crate::database::models::token_shift::TokenShift;
use crate::database::models::user::{Principal, Role};

use super::{AuthStore, StoreError, UserStore};

/// Postgres-backed store over the system database. All queries are bound at
/// runtime and scoped by the owning principal's id.
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub async fn connect() -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::main_pool().await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the auth tables when absent. Schema migration tooling is out
    /// of scope; this keeps a fresh database usable.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                tenant_id TEXT UNIQUE,
                company_name TEXT,
                phone TEXT,
                is_verified BOOLEAN NOT NULL DEFAULT FALSE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                last_login TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_sessions (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                session_token TEXT NOT NULL,
                device_info JSONB NOT NULL DEFAULT '{}',
                ip_address TEXT,
                user_agent TEXT NOT NULL DEFAULT '',
                login_at TIMESTAMPTZ NOT NULL,
                last_activity TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                UNIQUE (user_id, session_token)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS token_shifts (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                original_token TEXT NOT NULL,
                shifted_token TEXT NOT NULL,
                source_service TEXT NOT NULL,
                target_service TEXT NOT NULL,
                shift_reason TEXT NOT NULL DEFAULT '',
                token_type TEXT NOT NULL DEFAULT 'access',
                expires_at TIMESTAMPTZ NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                shifted_at TIMESTAMPTZ NOT NULL,
                last_used TIMESTAMPTZ,
                usage_count INTEGER NOT NULL DEFAULT 0,
                ip_address TEXT,
                user_agent TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS token_blacklist (
                token_digest TEXT PRIMARY KEY,
                user_id UUID NOT NULL,
                blacklisted_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn decode_failure(column: &str, value: &str) -> StoreError {
    StoreError::Unavailable(format!("unrecognized {} value in store: {}", column, value))
}

fn user_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    let role: String = row.get("role");
    Ok(Principal {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::parse(&role).ok_or_else(|| decode_failure("role", &role))?,
        tenant_id: row.get("tenant_id"),
        company_name: row.get("company_name"),
        phone: row.get("phone"),
        is_verified: row.get("is_verified"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, StoreError> {
    let device_info: serde_json::Value = row.get("device_info");
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_token: row.get("session_token"),
        device_info: serde_json::from_value(device_info).unwrap_or_default(),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        login_at: row.get("login_at"),
        last_activity: row.get("last_activity"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
    })
}

fn shift_from_row(row: &PgRow) -> Result<TokenShift, StoreError> {
    let source: String = row.get("source_service");
    let target: String = row.get("target_service");
    let token_type: String = row.get("token_type");
    Ok(TokenShift {
        id: row.get("id"),
        user_id: row.get("user_id"),
        original_token: row.get("original_token"),
        shifted_token: row.get("shifted_token"),
        source_service: ServiceName::parse(&source)
            .ok_or_else(|| decode_failure("source_service", &source))?,
        target_service: ServiceName::parse(&target)
            .ok_or_else(|| decode_failure("target_service", &target))?,
        shift_reason: row.get("shift_reason"),
        token_type: match token_type.as_str() {
            "refresh" => TokenKind::Refresh,
            _ => TokenKind::Access,
        },
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        shifted_at: row.get("shifted_at"),
        last_used: row.get("last_used"),
        usage_count: row.get("usage_count"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    })
}

#[async_trait]
impl UserStore for PgAuthStore {
    async fn insert_user(&self, user: &Principal) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, tenant_id,
                               company_name, phone, is_verified, is_active, created_at, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.tenant_id)
        .bind(&user.company_name)
        .bind(&user.phone)
        .bind(user.is_verified)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Conflict("username or email already registered".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn user_identity_taken(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = $1 OR email = $2")
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn upsert_session(&self, session: Session) -> Result<Session, StoreError> {
        let device_info = serde_json::to_value(&session.device_info)
            .unwrap_or_else(|_| serde_json::json!({}));

        let row = sqlx::query(
            r#"
            INSERT INTO user_sessions (id, user_id, session_token, device_info, ip_address,
                                       user_agent, login_at, last_activity, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id, session_token) DO UPDATE SET
                device_info = EXCLUDED.device_info,
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                last_activity = EXCLUDED.last_activity,
                expires_at = EXCLUDED.expires_at,
                is_active = EXCLUDED.is_active
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(device_info)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.login_at)
        .bind(session.last_activity)
        .bind(session.expires_at)
        .bind(session.is_active)
        .fetch_one(&self.pool)
        .await?;

        session_from_row(&row)
    }

    async fn close_session(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = FALSE, expires_at = $1
            WHERE user_id = $2 AND session_token = $3
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(token_digest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close_all_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = FALSE, expires_at = $1
            WHERE user_id = $2 AND is_active = TRUE
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND is_active = TRUE AND expires_at > $2
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = FALSE, expires_at = $1
            WHERE id = $2 AND user_id = $3
            "#,
        )
        .bind(now)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }

    async fn session_active(
        &self,
        user_id: Uuid,
        token_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM user_sessions
            WHERE user_id = $1 AND session_token = $2 AND is_active = TRUE AND expires_at > $3
            "#,
        )
        .bind(user_id)
        .bind(token_digest)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    async fn insert_shift(&self, shift: TokenShift) -> Result<TokenShift, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO token_shifts (id, user_id, original_token, shifted_token,
                                      source_service, target_service, shift_reason, token_type,
                                      expires_at, is_active, shifted_at, last_used, usage_count,
                                      ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(shift.id)
        .bind(shift.user_id)
        .bind(&shift.original_token)
        .bind(&shift.shifted_token)
        .bind(shift.source_service.as_str())
        .bind(shift.target_service.as_str())
        .bind(&shift.shift_reason)
        .bind(shift.token_type.as_str())
        .bind(shift.expires_at)
        .bind(shift.is_active)
        .bind(shift.shifted_at)
        .bind(shift.last_used)
        .bind(shift.usage_count)
        .bind(&shift.ip_address)
        .bind(&shift.user_agent)
        .fetch_one(&self.pool)
        .await?;

        shift_from_row(&row)
    }

    async fn list_shifts(&self, user_id: Uuid) -> Result<Vec<TokenShift>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM token_shifts WHERE user_id = $1 ORDER BY shifted_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(shift_from_row).collect()
    }

    async fn revoke_shift(&self, user_id: Uuid, shift_id: Uuid) -> Result<TokenShift, StoreError> {
        // Only active rows match; a repeat revocation reports NotFound
        let row = sqlx::query(
            r#"
            UPDATE token_shifts SET is_active = FALSE
            WHERE id = $1 AND user_id = $2 AND is_active = TRUE
            RETURNING *
            "#,
        )
        .bind(shift_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => shift_from_row(&row),
            None => Err(StoreError::NotFound(
                "Token shift record not found or already revoked".to_string(),
            )),
        }
    }

    async fn find_shift_by_token(&self, shifted_token: &str) -> Result<Option<TokenShift>, StoreError> {
        let row = sqlx::query("SELECT * FROM token_shifts WHERE shifted_token = $1")
            .bind(shifted_token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| shift_from_row(&r)).transpose()
    }

    async fn touch_shift(&self, shift_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        // Single-statement increment; safe under concurrent presenters
        sqlx::query(
            "UPDATE token_shifts SET usage_count = usage_count + 1, last_used = $1 WHERE id = $2",
        )
        .bind(now)
        .bind(shift_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn blacklist_token(
        &self,
        token_digest: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO token_blacklist (token_digest, user_id, blacklisted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_digest) DO NOTHING
            "#,
        )
        .bind(token_digest)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_blacklisted(&self, token_digest: &str) -> Result<bool, StoreError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM token_blacklist WHERE token_digest = $1")
                .bind(token_digest)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }
}
