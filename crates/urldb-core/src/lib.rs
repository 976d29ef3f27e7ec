//! # urldb-core
//!
//! Core crate for URLDB. Contains the unified error system, configuration
//! schemas, the domain event records handed to plugin hooks, and the
//! persistence traits implemented by `urldb-database`.
//!
//! This crate has **no** internal dependencies on other URLDB crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
