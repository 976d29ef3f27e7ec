//! Host schema migrations (plugin state tables).
//!
//! Plugin-declared migrations are tracked separately in `plugin_migrations`
//! by the runtime; this only creates the tables it writes to.

use sqlx::PgPool;
use tracing::info;

use urldb_core::error::{AppError, ErrorKind};

/// Applies pending host migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!("Running host database migrations");

    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    info!("Host database migrations complete");
    Ok(())
}
