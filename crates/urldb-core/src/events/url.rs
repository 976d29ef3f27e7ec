//! URL catalogue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalogued URL as seen by plugin hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Row identifier.
    pub id: i64,
    /// Short public key.
    pub key: String,
    /// Title.
    pub title: String,
    /// Target URL.
    pub url: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Category identifier, if assigned.
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Category name, if assigned or enriched by a plugin.
    #[serde(default)]
    pub category: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the target is known to resolve.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// Whether the URL is publicly listed.
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// Access counter.
    #[serde(default)]
    pub view_count: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Creates a new record stamped with the current time.
    pub fn new(id: i64, key: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            key: key.into(),
            title: title.into(),
            url: url.into(),
            description: String::new(),
            category_id: None,
            category: None,
            tags: Vec::new(),
            is_valid: true,
            is_public: true,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

fn default_true() -> bool {
    true
}
