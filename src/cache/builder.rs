//! Cache Builder Module
//!
//! Assembles a `MemoryCache` from configuration plus the execution contexts
//! it releases entries on and the runtime its trimmer runs on.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::cache::memory::{CacheCore, MemoryCache, SignalHook};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::release::{DeferredRelease, OnDemandThread, ReleaseExecutor, TokioBlocking};
use crate::tasks::spawn_trim_task;

// == Cache Builder ==
/// Builder for [`MemoryCache`].
///
/// Contexts left unset are resolved at `build` time:
/// - background context: the runtime's blocking pool if a runtime is
///   available, otherwise a release thread of the cache's own, started by
///   the first asynchronous release
/// - main context: none; `release_on_main` then falls back to the
///   background context
/// - trimmer runtime: the supplied handle, else the current runtime, else no
///   trimmer at all
#[derive(Default)]
pub struct CacheBuilder {
    config: CacheConfig,
    main_context: Option<Arc<dyn ReleaseExecutor>>,
    background_context: Option<Arc<dyn ReleaseExecutor>>,
    runtime: Option<Handle>,
    memory_pressure_hook: Option<SignalHook>,
    background_hook: Option<SignalHook>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn max_count(mut self, limit: usize) -> Self {
        self.config.max_count = limit;
        self
    }

    pub fn max_cost(mut self, limit: u64) -> Self {
        self.config.max_cost = limit;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = Some(max_age);
        self
    }

    pub fn trim_interval(mut self, interval: Duration) -> Self {
        self.config.trim_interval = interval;
        self
    }

    pub fn auto_trim(mut self, enabled: bool) -> Self {
        self.config.auto_trim = enabled;
        self
    }

    pub fn release_on_main(mut self, enabled: bool) -> Self {
        self.config.release_on_main = enabled;
        self
    }

    pub fn release_asynchronously(mut self, enabled: bool) -> Self {
        self.config.release_asynchronously = enabled;
        self
    }

    pub fn clear_on_memory_warning(mut self, enabled: bool) -> Self {
        self.config.clear_on_memory_warning = enabled;
        self
    }

    pub fn clear_on_background(mut self, enabled: bool) -> Self {
        self.config.clear_on_background = enabled;
        self
    }

    /// Sets the designated context used when `release_on_main` is on.
    pub fn main_context(mut self, executor: Arc<dyn ReleaseExecutor>) -> Self {
        self.main_context = Some(executor);
        self
    }

    /// Sets the context used for asynchronous release off the main context.
    pub fn background_context(mut self, executor: Arc<dyn ReleaseExecutor>) -> Self {
        self.background_context = Some(executor);
        self
    }

    /// Runs the trimmer on this runtime instead of the current one.
    ///
    /// Hosts that want trimming isolated from latency-sensitive work can pass
    /// the handle of a small runtime of their own.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Runs `hook` each time `on_memory_pressure` is signalled.
    pub fn memory_pressure_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.memory_pressure_hook = Some(Box::new(hook));
        self
    }

    /// Runs `hook` each time `on_background_transition` is signalled.
    pub fn background_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.background_hook = Some(Box::new(hook));
        self
    }

    // == Build ==
    /// Validates the configuration and starts the cache.
    pub fn build<K, V>(self) -> Result<MemoryCache<K, V>>
    where
        K: Hash + Eq + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        self.config.validate()?;

        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        let background: Arc<dyn ReleaseExecutor> = match (self.background_context, &runtime) {
            (Some(executor), _) => executor,
            (None, Some(handle)) => Arc::new(TokioBlocking::new(handle.clone())),
            (None, None) => Arc::new(OnDemandThread::new(format!("{}-release", self.config.name))),
        };

        let release = DeferredRelease::new(
            self.config.name.clone(),
            self.main_context,
            background,
            self.config.release_on_main,
            self.config.release_asynchronously,
        );
        let core = Arc::new(CacheCore::new(&self.config, release));

        let trimmer = match (self.config.auto_trim, runtime) {
            (true, Some(handle)) => Some(spawn_trim_task(Arc::clone(&core), &handle)),
            (true, None) => {
                warn!(
                    cache = %self.config.name,
                    "no tokio runtime available, background trimming disabled"
                );
                None
            }
            (false, _) => None,
        };

        info!(
            cache = %self.config.name,
            max_count = self.config.max_count,
            max_cost = self.config.max_cost,
            auto_trim = trimmer.is_some(),
            "memory cache initialized"
        );

        Ok(MemoryCache::from_parts(
            core,
            trimmer,
            self.memory_pressure_hook,
            self.background_hook,
        ))
    }
}
