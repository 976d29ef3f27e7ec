//! Domain records carried by business events.
//!
//! The host's business services (URL catalogue, accounts, public API,
//! resource ingestion) describe what happened with these records; the
//! plugin runtime places them into hook payloads under well-known keys.

pub mod api;
pub mod resource;
pub mod url;
pub mod user;

pub use api::ApiRequestRecord;
pub use resource::ReadyResourceRecord;
pub use url::UrlRecord;
pub use user::UserRecord;

/// Identity of the host application, exposed to plugins as `event.app`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppInfo {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "URLDB".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}
