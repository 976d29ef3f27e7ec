//! # urldb-database
//!
//! PostgreSQL connection management and the durable implementations of the
//! plugin runtime's persistence seams.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::{PgPluginDatabase, PgPluginStateStore};
