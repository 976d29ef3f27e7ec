//! Convenience result type alias for URLDB.

use crate::error::AppError;

/// A specialized `Result` type for URLDB operations.
pub type AppResult<T> = Result<T, AppError>;
