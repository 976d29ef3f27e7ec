//! # urldb-api
//!
//! HTTP API layer for URLDB built on Axum.
//!
//! Provides the plugin administration endpoints, the fallback that serves
//! plugin-registered routes, request logging and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
