//! Error types for the memory cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the memory cache.
///
/// Misses are never errors; `get` and `contains` report absence through
/// `Option` and `bool`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Adding the entry's cost would overflow the aggregate cost counter
    #[error("Cost overflow: entry cost {entry_cost} cannot be added to total cost {total_cost}")]
    CostOverflow { entry_cost: u64, total_cost: u64 },

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A release thread could not be started
    #[error("Failed to spawn release thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Structural invariant violated (reported by `validate`)
    #[error("Integrity check failed: {0}")]
    Integrity(String),
}

// == Result Type Alias ==
/// Convenience Result type for the memory cache.
pub type Result<T> = std::result::Result<T, CacheError>;
