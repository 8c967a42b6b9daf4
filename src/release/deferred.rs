//! Deferred Release
//!
//! Destroys detached entries after the cache lock has been dropped, on the
//! execution context chosen by the release policy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::executor::ReleaseExecutor;

// == Route ==
/// Where a release batch is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dropped on the calling thread before the cache call returns
    Inline,
    /// Enqueued on the designated (main) context
    Main,
    /// Enqueued on the background context
    Background,
}

// == Deferred Release ==
/// Release policy plus the contexts it dispatches to.
///
/// | asynchronous | on main | caller on main | route      |
/// |--------------|---------|----------------|------------|
/// | yes          | yes     | any            | Main       |
/// | yes          | no      | any            | Background |
/// | no           | yes     | yes            | Inline     |
/// | no           | yes     | no             | Main       |
/// | no           | no      | any            | Inline     |
///
/// The fourth row is deliberate: a synchronous release requested from off
/// the main context is still handed to the main context rather than blocking
/// the caller until the main context gets to it.
pub struct DeferredRelease {
    name: String,
    main: Option<Arc<dyn ReleaseExecutor>>,
    background: Arc<dyn ReleaseExecutor>,
    release_on_main: AtomicBool,
    release_asynchronously: AtomicBool,
}

impl DeferredRelease {
    // == Constructor ==
    /// Creates a release policy.
    ///
    /// Without a `main` context, `release_on_main` has nothing to dispatch to
    /// and the policy behaves as if the flag were off.
    pub fn new(
        name: impl Into<String>,
        main: Option<Arc<dyn ReleaseExecutor>>,
        background: Arc<dyn ReleaseExecutor>,
        release_on_main: bool,
        release_asynchronously: bool,
    ) -> Self {
        Self {
            name: name.into(),
            main,
            background,
            release_on_main: AtomicBool::new(release_on_main),
            release_asynchronously: AtomicBool::new(release_asynchronously),
        }
    }

    pub fn release_on_main(&self) -> bool {
        self.release_on_main.load(Ordering::Relaxed)
    }

    pub fn set_release_on_main(&self, value: bool) {
        self.release_on_main.store(value, Ordering::Relaxed);
    }

    pub fn release_asynchronously(&self) -> bool {
        self.release_asynchronously.load(Ordering::Relaxed)
    }

    pub fn set_release_asynchronously(&self, value: bool) {
        self.release_asynchronously.store(value, Ordering::Relaxed);
    }

    // == Route ==
    /// Picks the context for the next batch under the current flags.
    pub fn route(&self) -> Route {
        let main = self.main.as_ref().filter(|_| self.release_on_main());
        match (self.release_asynchronously(), main) {
            (true, Some(_)) => Route::Main,
            (true, None) => Route::Background,
            (false, Some(main)) if main.is_current() => Route::Inline,
            (false, Some(_)) => Route::Main,
            (false, None) => Route::Inline,
        }
    }

    // == Release ==
    /// Takes ownership of `batch` and destroys it according to the policy.
    ///
    /// Must be called with no cache lock held.
    pub fn release<T: Send + 'static>(&self, batch: T) {
        let route = self.route();
        trace!(cache = %self.name, ?route, "releasing detached entries");

        match (route, self.main.as_ref()) {
            (Route::Main, Some(main)) => main.execute(Box::new(move || drop(batch))),
            (Route::Background, _) => self.background.execute(Box::new(move || drop(batch))),
            _ => drop(batch),
        }
    }
}

impl fmt::Debug for DeferredRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredRelease")
            .field("name", &self.name)
            .field("has_main", &self.main.is_some())
            .field("release_on_main", &self.release_on_main())
            .field("release_asynchronously", &self.release_asynchronously())
            .finish()
    }
}
