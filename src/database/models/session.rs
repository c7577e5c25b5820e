use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client fingerprint captured at login, parsed from the User-Agent header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub platform: String,
    pub is_mobile: bool,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            browser: Self::parse_browser(user_agent),
            platform: Self::parse_platform(user_agent),
            is_mobile: user_agent.contains("Mobile")
                || user_agent.contains("Android")
                || user_agent.contains("iPhone"),
        }
    }

    fn parse_browser(user_agent: &str) -> String {
        for browser in ["Chrome", "Firefox", "Safari", "Edge", "Opera"] {
            if user_agent.contains(browser) {
                return browser.to_string();
            }
        }
        "Unknown".to_string()
    }

    fn parse_platform(user_agent: &str) -> String {
        for platform in ["Windows", "Mac", "Linux", "Android", "iPhone"] {
            if user_agent.contains(platform) {
                return platform.to_string();
            }
        }
        "Unknown".to_string()
    }
}

/// One authenticated login. `session_token` holds the sha256 digest of the
/// issued access credential, never the credential itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub session_token: String,
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub login_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Active flag alone is not enough; expiry is checked lazily at read time
    pub fn is_active_now(&self) -> bool {
        self.is_active && !self.is_expired()
    }
}
