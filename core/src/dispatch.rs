//! Moving work onto the host's affinity thread.
//!
//! # Design
//! The host engine only accepts network calls on one thread. Work destined for
//! that thread goes through an `AffinityExecutor`; the stock implementation is
//! a message queue whose receiving half, `MainThreadQueue`, is drained by the
//! host's own frame loop. Tasks are always queued, even when the caller is
//! already on the affinity thread, so a task never runs re-entrantly inside
//! the call that scheduled it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

use crate::config::BridgeConfig;
use crate::error::FetchError;

/// A unit of work that must run on the affinity thread.
pub type MainThreadTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on the thread that owns the host's network API.
pub trait AffinityExecutor: Send + Sync + 'static {
    /// Schedule `task`. Never runs it inline.
    fn run_in_main_thread(&self, task: MainThreadTask) -> Result<(), FetchError>;
}

/// Create the sending and draining halves of a main-thread queue.
pub fn main_thread_queue(config: &BridgeConfig) -> (MainThreadDispatcher, MainThreadQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MainThreadDispatcher { tx },
        MainThreadQueue {
            rx,
            budget: config.clone().clamped().max_tasks_per_drain,
            affinity_thread: None,
        },
    )
}

/// Cloneable sender half; hand one to every `AssetAccessor`.
#[derive(Debug, Clone)]
pub struct MainThreadDispatcher {
    tx: mpsc::UnboundedSender<MainThreadTask>,
}

impl AffinityExecutor for MainThreadDispatcher {
    fn run_in_main_thread(&self, task: MainThreadTask) -> Result<(), FetchError> {
        self.tx.send(task).map_err(|_| FetchError::MainThreadClosed)
    }
}

/// Receiving half, owned by the host's main loop.
pub struct MainThreadQueue {
    rx: mpsc::UnboundedReceiver<MainThreadTask>,
    budget: Option<usize>,
    affinity_thread: Option<ThreadId>,
}

impl MainThreadQueue {
    /// Run queued tasks on the current thread and return how many ran.
    ///
    /// Call once per frame from the affinity thread. At most
    /// `max_tasks_per_drain` tasks run per call; tasks queued by the tasks
    /// themselves wait for the next call when the budget is exhausted.
    pub fn dispatch_main_thread_tasks(&mut self) -> usize {
        self.check_affinity();

        let mut ran = 0;
        while self.budget.map_or(true, |budget| ran < budget) {
            let Ok(task) = self.rx.try_recv() else {
                break;
            };
            ran += 1;
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("main thread task panicked");
            }
        }
        if ran > 0 {
            tracing::trace!(ran, "drained main thread tasks");
        }
        ran
    }

    /// The thread that first drained this queue.
    pub fn affinity_thread(&self) -> Option<ThreadId> {
        self.affinity_thread
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn check_affinity(&mut self) {
        let current = thread::current().id();
        match self.affinity_thread {
            None => self.affinity_thread = Some(current),
            Some(owner) if owner != current => {
                tracing::warn!(?owner, ?current, "main thread queue drained from a foreign thread");
            }
            Some(_) => {}
        }
    }
}

impl std::fmt::Debug for MainThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadQueue")
            .field("budget", &self.budget)
            .field("affinity_thread", &self.affinity_thread)
            .finish_non_exhaustive()
    }
}
