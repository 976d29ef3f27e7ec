//! Raw SQL capability handed to plugins.
//!
//! Positional JSON parameters are bound by their JSON type. Query rows are
//! returned through `row_to_json`, so any column set round-trips without
//! a static row type.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use tracing::debug;

use urldb_core::error::{AppError, ErrorKind};
use urldb_core::result::AppResult;
use urldb_core::traits::PluginDatabase;

/// [`PluginDatabase`] over the shared pool.
#[derive(Debug, Clone)]
pub struct PgPluginDatabase {
    pool: PgPool,
}

impl PgPluginDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(Json(other)),
        };
    }
    query
}

/// Wraps a row-returning statement so each row becomes one JSON object.
fn as_json_rows(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!("SELECT row_to_json(t) AS row FROM ({inner}) t")
}

#[async_trait]
impl PluginDatabase for PgPluginDatabase {
    async fn execute(&self, sql: &str, params: &[Value]) -> AppResult<u64> {
        debug!(params = params.len(), "Plugin SQL execute");
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, format!("Plugin statement failed: {e}"), e))?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> AppResult<Vec<Value>> {
        debug!(params = params.len(), "Plugin SQL query");
        let wrapped = as_json_rows(sql);
        let rows = bind_all(sqlx::query(&wrapped), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, format!("Plugin query failed: {e}"), e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Value, _>("row").map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to decode plugin row", e)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_wrapped_for_json() {
        assert_eq!(
            as_json_rows("SELECT id, url FROM urls WHERE id = $1;"),
            "SELECT row_to_json(t) AS row FROM (SELECT id, url FROM urls WHERE id = $1) t"
        );
    }
}
