//! Deferred execution after the current batch of event handlers.
//!
//! Build events arrive in bursts: a `done` is frequently followed by an
//! `invalid` from a change that happened while compiling. Work scheduled
//! with [`TickQueue::defer`] runs only after the driver has dispatched every
//! event already queued, so deferred work can observe that invalidation and
//! stand down.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

type Task = Box<dyn FnOnce() + Send>;

/// FIFO of work to run on the next tick.
#[derive(Default)]
pub struct TickQueue {
    tasks: Mutex<VecDeque<Task>>,
    notify: Notify,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for the next tick.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        self.tasks.lock().push_back(Box::new(task));
        self.notify.notify_one();
    }

    /// Run every task queued so far, in order.
    ///
    /// Tasks deferred while running are left for the following tick.
    pub fn run_pending(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Resolves once a task has been deferred.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl std::fmt::Debug for TickQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickQueue")
            .field("pending", &self.tasks.lock().len())
            .finish()
    }
}
