//! Background Trim Task
//!
//! Periodically enforces a cache's cost, count and age limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// == Trim Report ==
/// Entries evicted by one trim pass, per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub by_cost: usize,
    pub by_count: usize,
    pub by_age: usize,
}

impl TrimReport {
    pub fn total(&self) -> usize {
        self.by_cost + self.by_count + self.by_age
    }
}

// == Trim ==
/// Something the trimmer can tick.
pub trait Trim: Send + Sync + 'static {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Current interval between passes; re-read before every sleep.
    fn trim_interval(&self) -> Duration;

    /// Runs one pass: cost, then count, then age.
    fn trim(&self) -> TrimReport;
}

// == Trim Task ==
/// Owned handle to a running trimmer. Dropping it cancels the task.
#[derive(Debug)]
pub struct TrimTask {
    handle: JoinHandle<()>,
}

impl TrimTask {
    /// Cancels the task. Idempotent.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TrimTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a task on `runtime` that trims `target` every `trim_interval`.
///
/// Each pass runs on the runtime's blocking pool so lock contention with
/// foreground callers never stalls an async worker thread.
///
/// # Example
/// ```ignore
/// let task = spawn_trim_task(core.clone(), &Handle::current());
/// // Later, during teardown:
/// drop(task);
/// ```
pub fn spawn_trim_task<T: Trim>(target: Arc<T>, runtime: &Handle) -> TrimTask {
    let handle = runtime.spawn(async move {
        info!(
            cache = %target.name(),
            "Starting trim task with interval of {:?}",
            target.trim_interval()
        );

        loop {
            tokio::time::sleep(target.trim_interval()).await;

            let pass = Arc::clone(&target);
            let report = match tokio::task::spawn_blocking(move || pass.trim()).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(cache = %target.name(), error = %err, "trim pass failed");
                    continue;
                }
            };

            if report.total() > 0 {
                info!(
                    cache = %target.name(),
                    by_cost = report.by_cost,
                    by_count = report.by_count,
                    by_age = report.by_age,
                    "Trim: evicted {} entries",
                    report.total()
                );
            } else {
                debug!(cache = %target.name(), "Trim: nothing to evict");
            }
        }
    });

    TrimTask { handle }
}
