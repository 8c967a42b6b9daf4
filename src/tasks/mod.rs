//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Trim: enforces cost, count and age limits at the configured interval

mod trim;

pub use trim::{spawn_trim_task, Trim, TrimReport, TrimTask};
