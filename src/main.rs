//! URLDB server: link database host with a plugin hook runtime.
//!
//! Loads configuration, initializes logging and hands over to the API
//! crate's server runner.

use tracing_subscriber::{EnvFilter, fmt};

use urldb_core::config::AppConfig;
use urldb_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = urldb_api::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Loads `config/default.toml`, the `URLDB_ENV` overlay and `URLDB__*`
/// environment variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    let dir = std::env::var("URLDB_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let env = std::env::var("URLDB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(&dir, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
