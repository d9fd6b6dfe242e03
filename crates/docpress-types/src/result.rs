//! Result type alias for docpress operations

use crate::Error;

/// Result type alias for docpress operations
pub type Result<T> = std::result::Result<T, Error>;
