//! Release Executors
//!
//! Execution contexts that detached entries can be destroyed on.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// A unit of destruction work handed to an executor.
pub type ReleaseJob = Box<dyn FnOnce() + Send + 'static>;

// == Release Executor ==
/// An execution context that runs release jobs.
pub trait ReleaseExecutor: Send + Sync {
    /// Schedules `job`. Implementations must not block on the job's completion.
    fn execute(&self, job: ReleaseJob);

    /// True when the calling thread already belongs to this context.
    fn is_current(&self) -> bool;
}

// == Dedicated Thread ==
/// A named OS thread draining a job queue in order.
///
/// This is the usual stand-in for a "main" context: it owns a single thread,
/// so `is_current` is an exact thread-id check. The thread exits once every
/// handle to the executor has been dropped and the queue is drained.
pub struct DedicatedThread {
    name: String,
    sender: mpsc::UnboundedSender<ReleaseJob>,
    thread_id: ThreadId,
}

impl DedicatedThread {
    // == Constructor ==
    /// Starts the thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<ReleaseJob>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                job();
            }
            debug!(thread = %thread_name, "release thread exiting");
        })?;

        Ok(Self {
            name,
            sender,
            thread_id: handle.thread().id(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl ReleaseExecutor for DedicatedThread {
    fn execute(&self, job: ReleaseJob) {
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            warn!(thread = %self.name, "release thread is gone, releasing inline");
            job();
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl fmt::Debug for DedicatedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedicatedThread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

// == On-Demand Thread ==
/// A [`DedicatedThread`] started by the first job it receives.
///
/// Caches that never release asynchronously never pay for the thread. If
/// the thread cannot be started, jobs run inline on the caller.
pub struct OnDemandThread {
    name: String,
    thread: OnceLock<Option<DedicatedThread>>,
}

impl OnDemandThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            thread: OnceLock::new(),
        }
    }

    /// True once the first job has started the thread.
    pub fn is_started(&self) -> bool {
        self.started().is_some()
    }

    fn started(&self) -> Option<&DedicatedThread> {
        self.thread.get().and_then(Option::as_ref)
    }
}

impl ReleaseExecutor for OnDemandThread {
    fn execute(&self, job: ReleaseJob) {
        let thread = self.thread.get_or_init(|| match DedicatedThread::spawn(self.name.clone()) {
            Ok(thread) => Some(thread),
            Err(err) => {
                warn!(
                    thread = %self.name,
                    error = %err,
                    "failed to start release thread, releasing inline"
                );
                None
            }
        });

        match thread {
            Some(thread) => thread.execute(job),
            None => job(),
        }
    }

    fn is_current(&self) -> bool {
        self.started().is_some_and(DedicatedThread::is_current)
    }
}

impl fmt::Debug for OnDemandThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandThread")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .finish()
    }
}

// == Tokio Blocking Pool ==
#[derive(Default)]
struct JobQueue {
    jobs: VecDeque<ReleaseJob>,
    draining: bool,
}

/// Runs jobs on a tokio runtime's blocking thread pool.
///
/// Jobs go through one shared queue. A single blocking task drains it, and a
/// new one is spawned only when the queue was idle, so a burst of releases
/// costs one `spawn_blocking` rather than one per job. Jobs run in
/// submission order.
///
/// A pool has no single thread to be "on", so `is_current` is always false.
#[derive(Clone)]
pub struct TokioBlocking {
    handle: Handle,
    queue: Arc<Mutex<JobQueue>>,
}

impl TokioBlocking {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            queue: Arc::new(Mutex::new(JobQueue::default())),
        }
    }

    /// Uses the runtime the caller is running inside, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    fn drain(queue: &Mutex<JobQueue>) {
        loop {
            let job = {
                let mut queue = queue.lock();
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            job();
        }
    }
}

impl ReleaseExecutor for TokioBlocking {
    fn execute(&self, job: ReleaseJob) {
        let idle = {
            let mut queue = self.queue.lock();
            queue.jobs.push_back(job);
            !std::mem::replace(&mut queue.draining, true)
        };

        if idle {
            let queue = Arc::clone(&self.queue);
            // The join handle is dropped; the drain runs detached.
            drop(self.handle.spawn_blocking(move || Self::drain(&queue)));
        }
    }

    fn is_current(&self) -> bool {
        false
    }
}

impl fmt::Debug for TokioBlocking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("TokioBlocking")
            .field("queued", &queue.jobs.len())
            .field("draining", &queue.draining)
            .finish()
    }
}

// == Inline ==
/// Runs every job immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl ReleaseExecutor for Inline {
    fn execute(&self, job: ReleaseJob) {
        job();
    }

    fn is_current(&self) -> bool {
        true
    }
}
