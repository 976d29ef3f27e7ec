//! Raw database capability offered to plugins.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::AppResult;

/// Raw SQL access for plugin handlers and migrations.
///
/// Parameters are positional JSON values; rows come back as JSON objects.
/// Implementations must tolerate concurrent calls from many plugins.
#[async_trait]
pub trait PluginDatabase: Send + Sync + std::fmt::Debug {
    /// Executes a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> AppResult<u64>;

    /// Runs a query and returns every row as a JSON object.
    async fn query(&self, sql: &str, params: &[Value]) -> AppResult<Vec<Value>>;
}
