//! Execution-mode marshaling
//!
//! Pipelines never own a thread pool; they hand work to whatever the
//! host provides through a [`ThreadDispatcher`]. Redirection is
//! cooperative: a dispatcher routes a job to a named lane, it does not
//! schedule or prioritize.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Named execution lane for a piece of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Run inline on the calling thread
    Current,
    /// Run on the host's designated main lane (e.g. a UI loop)
    Main,
    /// Run on a background thread
    Background,
}

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Routes jobs onto execution lanes.
pub trait ThreadDispatcher: Send + Sync + 'static {
    fn execute(&self, mode: ExecutionMode, job: Job);
}

/// Dispatcher backed by a tokio runtime.
///
/// `Main` jobs are drained in order by a dedicated task, `Background`
/// jobs go through `spawn_blocking`, `Current` runs inline. Must be
/// created from within a runtime.
pub struct TokioDispatcher {
    handle: tokio::runtime::Handle,
    main_lane: mpsc::UnboundedSender<Job>,
}

impl TokioDispatcher {
    pub fn new() -> Self {
        let handle = tokio::runtime::Handle::current();
        let (main_lane, mut jobs) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = jobs.recv().await {
                job();
            }
        });
        Self { handle, main_lane }
    }
}

impl Default for TokioDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadDispatcher for TokioDispatcher {
    fn execute(&self, mode: ExecutionMode, job: Job) {
        match mode {
            ExecutionMode::Current => job(),
            ExecutionMode::Main => {
                if let Err(returned) = self.main_lane.send(job) {
                    // Lane task is gone (runtime shutting down); run
                    // inline rather than dropping the work.
                    warn!("main lane closed; running job inline");
                    (returned.0)();
                }
            }
            ExecutionMode::Background => {
                self.handle.spawn_blocking(job);
            }
        }
    }
}

/// Dispatcher that runs every job inline, whatever the mode.
///
/// Deterministic by construction; intended for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl ThreadDispatcher for InlineDispatcher {
    fn execute(&self, _mode: ExecutionMode, job: Job) {
        job();
    }
}

/// Shared dispatcher handle used across pipelines.
pub type DispatcherHandle = Arc<dyn ThreadDispatcher>;
