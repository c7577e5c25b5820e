use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Principal role, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Shipper,
    Receiver,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Shipper => "shipper",
            Role::Receiver => "receiver",
            Role::Driver => "driver",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "shipper" => Some(Role::Shipper),
            "receiver" => Some(Role::Receiver),
            "driver" => Some(Role::Driver),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Shipper
    }
}

/// An authenticated user identity. Tenant affiliation is set at registration
/// and never updated afterwards; an admin-gated transfer operation does not
/// exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub tenant_id: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Principal {
    /// Client-facing profile body, password hash excluded
    pub fn profile(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "role": self.role,
            "tenant_id": self.tenant_id,
            "company_name": self.company_name,
            "phone": self.phone,
            "is_verified": self.is_verified,
            "is_active": self.is_active,
            "date_joined": self.created_at,
            "last_login": self.last_login,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_closed_set_only() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("driver"), Some(Role::Driver));
        assert_eq!(Role::parse("manager"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn profile_never_exposes_password_hash() {
        let principal = Principal {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::Shipper,
            tenant_id: Some("acme-1a2b3c4d".to_string()),
            company_name: Some("Acme".to_string()),
            phone: None,
            is_verified: true,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        let body = principal.profile().to_string();
        assert!(!body.contains("argon2"));
        assert!(body.contains("alice"));
    }
}
