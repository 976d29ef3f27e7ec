//! Public API request records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An inbound public API request, offered to `onAPIRequest` hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequestRecord {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Request headers (lower-cased names).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Client address.
    #[serde(default)]
    pub client_ip: Option<String>,
    /// Response status, once known.
    #[serde(default)]
    pub status: Option<u16>,
}

impl ApiRequestRecord {
    /// Creates a record for the given method and path.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            client_ip: None,
            status: None,
        }
    }
}
