//! Ready-resource ingestion records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resource queued for publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyResourceRecord {
    /// Row identifier.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Share URL.
    pub url: String,
    /// Where the resource came from.
    #[serde(default)]
    pub source: String,
    /// Queue time.
    pub created_at: DateTime<Utc>,
}
