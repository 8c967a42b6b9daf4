//! Cache Module
//!
//! Provides the bounded in-process cache: an arena-backed recency list, the
//! key index kept in lockstep with it, and the locked orchestrator.

mod builder;
mod entry;
mod lru;
mod memory;
mod stats;
mod store;


// Re-export public types
pub use builder::CacheBuilder;
pub use entry::{Entry, SlotId};
pub use lru::{Iter, RecencyList};
pub use memory::{MemoryCache, SignalHook};
pub use stats::CacheStats;
pub use store::{Detached, LruStore};
