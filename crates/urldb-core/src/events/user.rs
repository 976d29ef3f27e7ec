//! Account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account as seen by the login hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Row identifier.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Role name.
    #[serde(default)]
    pub role: String,
    /// Client address of the login.
    #[serde(default)]
    pub login_ip: Option<String>,
    /// When the login happened.
    pub login_at: DateTime<Utc>,
}

impl UserRecord {
    /// Creates a login record stamped with the current time.
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            role: "user".to_string(),
            login_ip: None,
            login_at: Utc::now(),
        }
    }
}
