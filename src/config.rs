//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables
//! or any serde source.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Default interval between background trim passes.
pub const DEFAULT_TRIM_INTERVAL: Duration = Duration::from_secs(5);

/// Cache configuration parameters.
///
/// Every limit defaults to "unbounded", so a cache built from the defaults
/// only sheds entries on explicit trims, `clear`, or a platform signal.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name used in log output
    pub name: String,
    /// Entry count the background trimmer enforces
    pub max_count: usize,
    /// Aggregate cost the background trimmer enforces
    pub max_cost: u64,
    /// Maximum idle age the background trimmer enforces, None = unbounded
    pub max_age: Option<Duration>,
    /// Interval between background trim passes
    pub trim_interval: Duration,
    /// Whether a background trimmer is started at all
    pub auto_trim: bool,
    /// Destroy evicted entries on the designated (main) context
    pub release_on_main: bool,
    /// Destroy evicted entries without blocking the caller
    pub release_asynchronously: bool,
    /// Clear the cache when `on_memory_pressure` is signalled
    pub clear_on_memory_warning: bool,
    /// Clear the cache when `on_background_transition` is signalled
    pub clear_on_background: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Name used in log output (default: "memory_cache")
    /// - `CACHE_MAX_COUNT` - Entry count limit (default: unbounded)
    /// - `CACHE_MAX_COST` - Aggregate cost limit (default: unbounded)
    /// - `CACHE_MAX_AGE_SECS` - Idle age limit in seconds (default: unbounded)
    /// - `CACHE_TRIM_INTERVAL_SECS` - Trim frequency in seconds (default: 5)
    /// - `CACHE_AUTO_TRIM` - Start the background trimmer (default: true)
    /// - `CACHE_RELEASE_ON_MAIN` - Release on the designated context (default: false)
    /// - `CACHE_RELEASE_ASYNC` - Release asynchronously (default: true)
    /// - `CACHE_CLEAR_ON_MEMORY_WARNING` - Clear on memory pressure (default: true)
    /// - `CACHE_CLEAR_ON_BACKGROUND` - Clear on background transition (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env::var("CACHE_NAME").unwrap_or(defaults.name),
            max_count: env_or("CACHE_MAX_COUNT", defaults.max_count),
            max_cost: env_or("CACHE_MAX_COST", defaults.max_cost),
            max_age: env_parse::<f64>("CACHE_MAX_AGE_SECS")
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .or(defaults.max_age),
            trim_interval: env_parse::<f64>("CACHE_TRIM_INTERVAL_SECS")
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(defaults.trim_interval),
            auto_trim: env_or("CACHE_AUTO_TRIM", defaults.auto_trim),
            release_on_main: env_or("CACHE_RELEASE_ON_MAIN", defaults.release_on_main),
            release_asynchronously: env_or("CACHE_RELEASE_ASYNC", defaults.release_asynchronously),
            clear_on_memory_warning: env_or(
                "CACHE_CLEAR_ON_MEMORY_WARNING",
                defaults.clear_on_memory_warning,
            ),
            clear_on_background: env_or("CACHE_CLEAR_ON_BACKGROUND", defaults.clear_on_background),
        }
    }

    // == Validate ==
    /// Rejects values the trimmer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.trim_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "trim_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "memory_cache".to_string(),
            max_count: usize::MAX,
            max_cost: u64::MAX,
            max_age: None,
            trim_interval: DEFAULT_TRIM_INTERVAL,
            auto_trim: true,
            release_on_main: false,
            release_asynchronously: true,
            clear_on_memory_warning: true,
            clear_on_background: true,
        }
    }
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    env_parse(var).unwrap_or(default)
}
