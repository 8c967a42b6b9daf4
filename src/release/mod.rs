//! Release Module
//!
//! Destruction of evicted entries outside the cache's critical section.
//!
//! # Components
//! - Executors: contexts a release job can run on
//! - DeferredRelease: the policy choosing between them

mod deferred;
mod executor;

pub use deferred::{DeferredRelease, Route};
pub use executor::{
    DedicatedThread, Inline, OnDemandThread, ReleaseExecutor, ReleaseJob, TokioBlocking,
};
