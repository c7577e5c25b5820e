use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::database::models::user::Role;

/// Closed set of services credentials can be scoped to. Every call site that
/// validates a target service consumes this enum, so the allow-list cannot
/// drift between endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceName {
    #[serde(rename = "api-gateway")]
    ApiGateway,
    #[serde(rename = "users-service")]
    UsersService,
    #[serde(rename = "shipping-service")]
    ShippingService,
    #[serde(rename = "tracking-service")]
    TrackingService,
    #[serde(rename = "notifications-service")]
    NotificationsService,
    #[serde(rename = "analytics-service")]
    AnalyticsService,
}

impl ServiceName {
    pub const ALL: [ServiceName; 6] = [
        ServiceName::ApiGateway,
        ServiceName::UsersService,
        ServiceName::ShippingService,
        ServiceName::TrackingService,
        ServiceName::NotificationsService,
        ServiceName::AnalyticsService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::ApiGateway => "api-gateway",
            ServiceName::UsersService => "users-service",
            ServiceName::ShippingService => "shipping-service",
            ServiceName::TrackingService => "tracking-service",
            ServiceName::NotificationsService => "notifications-service",
            ServiceName::AnalyticsService => "analytics-service",
        }
    }

    pub fn parse(value: &str) -> Option<ServiceName> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    /// Comma-separated list of valid names, used in validation messages
    pub fn valid_choices() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access tokens authenticate requests; refresh tokens are exchanged for new
/// pairs and are the only kind the blacklist tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    /// Tenant scope; absent for unaffiliated principals
    pub tenant: Option<String>,
    pub token_use: TokenKind,
    /// Target service for shifted credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shifted_at: Option<DateTime<Utc>>,
    pub exp: i64,
    pub iat: i64,
    /// Unique token id; makes every mint distinct even within one second
    pub jti: Uuid,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        username: String,
        role: Role,
        tenant: Option<String>,
        token_use: TokenKind,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            username,
            role,
            tenant,
            token_use,
            service: None,
            shifted_at: None,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        }
    }

    /// Claims for a shifted credential: same principal, scoped to a target
    /// service, with its own TTL independent of the login session.
    pub fn shifted(mut self, target: ServiceName) -> Self {
        self.service = Some(target);
        self.shifted_at = Some(Utc::now());
        self
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
    #[error("JWT secret not configured")]
    InvalidSecret,
    #[error("token is malformed or has an invalid signature")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token is a {found} token, expected {expected}")]
    WrongKind { expected: &'static str, found: &'static str },
    #[error("token is scoped to service '{found}', expected '{expected}'")]
    WrongService { expected: String, found: String },
    #[error("token carries no service scope")]
    MissingService,
    #[error("token has been revoked")]
    Revoked,
    #[error("no active session for token")]
    SessionInactive,
}

pub fn generate_jwt(claims: &Claims) -> Result<String, AuthError> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Validate signature and expiry, returning the embedded claims
pub fn decode_jwt(token: &str) -> Result<Claims, AuthError> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::Expired),
            _ => Err(AuthError::Malformed),
        },
    }
}

/// Decode and require a specific token kind
pub fn decode_jwt_expecting(token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
    let claims = decode_jwt(token)?;
    if claims.token_use != expected {
        return Err(AuthError::WrongKind {
            expected: expected.as_str(),
            found: claims.token_use.as_str(),
        });
    }
    Ok(claims)
}

/// Stable digest of a credential. Raw tokens are never stored: sessions are
/// keyed by this digest and the blacklist records it.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Redact a credential for at-rest storage: first and last 10 characters
/// only, so a store compromise cannot replay the original.
pub fn redact_token(token: &str) -> String {
    if token.len() <= 20 {
        return "...".to_string();
    }
    format!("{}...{}", &token[..10], &token[token.len() - 10..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(kind: TokenKind) -> Claims {
        Claims::new(
            Uuid::new_v4(),
            "alice".to_string(),
            Role::Shipper,
            Some("acme-1a2b3c4d".to_string()),
            kind,
            Duration::minutes(60),
        )
    }

    #[test]
    fn round_trips_access_token() {
        let claims = claims(TokenKind::Access);
        let token = generate_jwt(&claims).unwrap();
        let decoded = decode_jwt_expecting(&token, TokenKind::Access).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.tenant.as_deref(), Some("acme-1a2b3c4d"));
        assert!(decoded.service.is_none());
    }

    #[test]
    fn rejects_wrong_token_kind() {
        let token = generate_jwt(&claims(TokenKind::Refresh)).unwrap();
        let err = decode_jwt_expecting(&token, TokenKind::Access).unwrap_err();
        assert!(matches!(err, AuthError::WrongKind { .. }));
    }

    #[test]
    fn rejects_expired_token() {
        let mut c = claims(TokenKind::Access);
        c.exp = (Utc::now() - Duration::hours(2)).timestamp();
        let token = generate_jwt(&c).unwrap();
        assert!(matches!(decode_jwt(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_garbage_token() {
        assert!(matches!(decode_jwt("not-a-jwt"), Err(AuthError::Malformed)));
    }

    #[test]
    fn shifted_claims_carry_service_scope() {
        let c = claims(TokenKind::Access).shifted(ServiceName::AnalyticsService);
        let token = generate_jwt(&c).unwrap();
        let decoded = decode_jwt(&token).unwrap();
        assert_eq!(decoded.service, Some(ServiceName::AnalyticsService));
        assert!(decoded.shifted_at.is_some());
    }

    #[test]
    fn service_name_parses_only_known_values() {
        assert_eq!(ServiceName::parse("analytics-service"), Some(ServiceName::AnalyticsService));
        assert_eq!(ServiceName::parse("billing-service"), None);
        assert!(ServiceName::valid_choices().contains("api-gateway"));
    }

    #[test]
    fn redaction_keeps_only_edges() {
        let token = "abcdefghijKLMNOPQRSTuvwxyz012345";
        let redacted = redact_token(token);
        assert_eq!(redacted, "abcdefghij...wxyz012345");
        assert!(!redacted.contains("KLMNOPQRST"));
        assert_eq!(redact_token("short"), "...");
    }

    #[test]
    fn digest_is_stable_and_hex() {
        let d1 = token_digest("token-a");
        let d2 = token_digest("token-a");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert_ne!(d1, token_digest("token-b"));
    }
}
