//! PostgreSQL connection pool.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use urldb_core::config::DatabaseConfig;
use urldb_core::error::{AppError, ErrorKind};

/// Shared sqlx pool used by the state store and the plugin SQL capability.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Connects when a URL is configured; `Ok(None)` means run in memory.
    pub async fn connect_if_configured(config: &DatabaseConfig) -> Result<Option<Self>, AppError> {
        if !config.is_configured() {
            warn!("No database URL configured; plugin state will not survive restarts");
            return Ok(None);
        }
        Self::connect(config).await.map(Some)
    }

    /// Opens the pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to database: {e}"),
                    e,
                )
            })?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips `SELECT 1`.
    pub async fn health_check(&self) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Health check failed", e))
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Hides the password of a connection URL for logging.
fn mask_password(url: &str) -> String {
    let Some(at_pos) = url.find('@') else {
        return url.to_string();
    };
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[..at_pos].rfind(':') {
        Some(colon_pos) if colon_pos > scheme_end => {
            format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://urldb:hunter2@db:5432/urldb"),
            "postgres://urldb:****@db:5432/urldb"
        );
        assert_eq!(
            mask_password("postgres://db:5432/urldb"),
            "postgres://db:5432/urldb"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_database_runs_in_memory() {
        let pool = DatabasePool::connect_if_configured(&DatabaseConfig::default())
            .await
            .unwrap();
        assert!(pool.is_none());
    }
}
