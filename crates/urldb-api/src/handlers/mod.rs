//! HTTP handlers.

pub mod dispatch;
pub mod health;
pub mod plugin;
