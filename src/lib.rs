//! Memory Cache - A bounded in-process key-value cache
//!
//! Holds decoded or computed artifacts under count, cost and age limits,
//! evicting least recently used entries first. Evicted values are destroyed
//! outside the cache lock, optionally on another execution context.

pub mod cache;
pub mod config;
pub mod error;
pub mod release;
pub mod tasks;

pub use cache::{CacheBuilder, CacheStats, MemoryCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::TrimReport;
