use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{ServiceName, TokenKind};

/// One relay of a credential from a source service to a target service.
/// `original_token` is redacted before it reaches the store; `shifted_token`
/// is the full newly minted credential. Rows are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenShift {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_token: String,
    pub shifted_token: String,
    pub source_service: ServiceName,
    pub target_service: ServiceName,
    pub shift_reason: String,
    pub token_type: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub shifted_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: i32,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl TokenShift {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_expired()
    }

    /// Short preview of the shifted credential for responses and logs
    pub fn token_preview(&self) -> String {
        crate::auth::redact_token(&self.shifted_token)
    }

    /// History row as returned by the API, with computed expiry state
    pub fn history_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "source_service": self.source_service,
            "target_service": self.target_service,
            "shift_reason": self.shift_reason,
            "token_type": self.token_type,
            "expires_at": self.expires_at,
            "is_active": self.is_active,
            "is_expired": self.is_expired(),
            "shifted_at": self.shifted_at,
            "last_used": self.last_used,
            "usage_count": self.usage_count,
        })
    }
}
