//! Hook points and the mutable event object passed down a dispatch chain.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use urldb_core::events::{
    ApiRequestRecord, AppInfo, ReadyResourceRecord, UrlRecord, UserRecord,
};

/// Every event type plugins can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// A URL was created.
    UrlAdd,
    /// A URL was visited.
    UrlAccess,
    /// A URL was edited.
    UrlUpdate,
    /// A URL was removed.
    UrlDelete,
    /// A user signed in.
    UserLogin,
    /// An API request passed through the host.
    ApiRequest,
    /// A resource was queued for publication.
    ReadyResourceAdd,
}

impl HookPoint {
    /// All hook points, in declaration order.
    pub const ALL: [HookPoint; 7] = [
        Self::UrlAdd,
        Self::UrlAccess,
        Self::UrlUpdate,
        Self::UrlDelete,
        Self::UserLogin,
        Self::ApiRequest,
        Self::ReadyResourceAdd,
    ];

    /// Returns the snake_case name used in logs and the admin API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlAdd => "url_add",
            Self::UrlAccess => "url_access",
            Self::UrlUpdate => "url_update",
            Self::UrlDelete => "url_delete",
            Self::UserLogin => "user_login",
            Self::ApiRequest => "api_request",
            Self::ReadyResourceAdd => "ready_resource_add",
        }
    }

    /// Returns the subscription binding name as written in plugin headers.
    pub fn binding_name(&self) -> &'static str {
        match self {
            Self::UrlAdd => "onURLAdd",
            Self::UrlAccess => "onURLAccess",
            Self::UrlUpdate => "onURLUpdate",
            Self::UrlDelete => "onURLDelete",
            Self::UserLogin => "onUserLogin",
            Self::ApiRequest => "onAPIRequest",
            Self::ReadyResourceAdd => "onReadyResourceAdd",
        }
    }

    /// Parses either form returned by [`as_str`](Self::as_str) or
    /// [`binding_name`](Self::binding_name).
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|hook| hook.as_str() == value || hook.binding_name() == value)
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The event object handed to every handler of one dispatch.
///
/// Fields live in a flat `data` map so handlers can enrich the payload
/// (for example set `url.category`) and downstream handlers observe the
/// change. Typed accessors cover the well-known keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// Unique id of this occurrence.
    pub id: Uuid,
    /// Event type.
    pub hook: HookPoint,
    /// Payload fields.
    pub data: HashMap<String, serde_json::Value>,
    /// Host application info.
    pub app: AppInfo,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
}

impl HookEvent {
    /// Creates an empty event.
    pub fn new(hook: HookPoint) -> Self {
        Self {
            id: Uuid::now_v7(),
            hook,
            data: HashMap::new(),
            app: AppInfo::default(),
            timestamp: Utc::now(),
        }
    }

    /// `UrlAdd` event carrying `url`.
    pub fn url_add(url: &UrlRecord) -> Self {
        Self::new(HookPoint::UrlAdd).with_record("url", url)
    }

    /// `UrlAccess` event carrying `url`.
    pub fn url_access(url: &UrlRecord) -> Self {
        Self::new(HookPoint::UrlAccess).with_record("url", url)
    }

    /// `UrlUpdate` event carrying the new `url` and the `old_url`.
    pub fn url_update(url: &UrlRecord, old_url: &UrlRecord) -> Self {
        Self::new(HookPoint::UrlUpdate)
            .with_record("url", url)
            .with_record("old_url", old_url)
    }

    /// `UrlDelete` event carrying `url`.
    pub fn url_delete(url: &UrlRecord) -> Self {
        Self::new(HookPoint::UrlDelete).with_record("url", url)
    }

    /// `UserLogin` event carrying `user`.
    pub fn user_login(user: &UserRecord) -> Self {
        Self::new(HookPoint::UserLogin).with_record("user", user)
    }

    /// `ApiRequest` event carrying `request`.
    pub fn api_request(request: &ApiRequestRecord) -> Self {
        Self::new(HookPoint::ApiRequest).with_record("request", request)
    }

    /// `ReadyResourceAdd` event carrying `resource`.
    pub fn ready_resource_add(resource: &ReadyResourceRecord) -> Self {
        Self::new(HookPoint::ReadyResourceAdd).with_record("resource", resource)
    }

    /// Replaces the host application info.
    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// Adds a raw JSON field.
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Adds a serializable record under `key`.
    pub fn with_record<T: Serialize>(self, key: &str, record: &T) -> Self {
        let value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
        self.with_data(key, value)
    }

    /// Returns a raw field.
    pub fn get_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns a raw field for in-place mutation.
    pub fn get_data_mut(&mut self, key: &str) -> Option<&mut serde_json::Value> {
        self.data.get_mut(key)
    }

    /// Returns a string field.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Returns an integer field.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Returns a boolean field.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Sets a raw field.
    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Deserializes the field under `key`.
    pub fn record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Serializes `record` into the field under `key`.
    pub fn set_record<T: Serialize>(
        &mut self,
        key: &str,
        record: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(record)?;
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    /// The `url` field, if present.
    pub fn url(&self) -> Option<UrlRecord> {
        self.record("url")
    }

    /// The `user` field, if present.
    pub fn user(&self) -> Option<UserRecord> {
        self.record("user")
    }

    /// The `request` field, if present.
    pub fn request(&self) -> Option<ApiRequestRecord> {
        self.record("request")
    }

    /// The `resource` field, if present.
    pub fn resource(&self) -> Option<ReadyResourceRecord> {
        self.record("resource")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_point_parses_both_spellings() {
        assert_eq!(HookPoint::parse("onURLAdd"), Some(HookPoint::UrlAdd));
        assert_eq!(HookPoint::parse("user_login"), Some(HookPoint::UserLogin));
        assert_eq!(HookPoint::parse("onSomething"), None);
    }

    #[test]
    fn test_url_record_can_be_mutated_in_place() {
        let url = UrlRecord::new(7, "abc", "Docs", "https://docs.rs");
        let mut event = HookEvent::url_add(&url);

        if let Some(record) = event.get_data_mut("url") {
            record["category"] = serde_json::json!("rust");
        }

        let enriched = event.url().expect("url present");
        assert_eq!(enriched.id, 7);
        assert_eq!(enriched.category.as_deref(), Some("rust"));
    }
}
