//! Lifetime extension for event handlers.
//!
//! The host may be torn down between events, so any work an event starts
//! but does not await (a detached cache write, a notification display) is
//! registered here. The host calls `settle` before shutting down.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

type Task = (&'static str, JoinHandle<()>);

#[derive(Default)]
struct Tasks {
    running: Vec<Task>,
    /// Tasks already joined while pruning, not yet counted by `settle`.
    reaped: usize,
}

#[derive(Clone, Default)]
pub struct KeepAlive {
    tasks: Arc<Mutex<Tasks>>,
}

fn report(label: &'static str, outcome: Result<(), JoinError>) {
    if let Err(e) = outcome {
        warn!(task = label, error = %e, "Kept-alive task did not complete");
    }
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        // A panicking task never holds this lock, so poisoning carries no
        // broken invariant.
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `future` and keep the host alive until it finishes.
    pub fn wait_until<F>(&self, label: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.tasks();
        let (finished, running): (Vec<Task>, Vec<Task>) = std::mem::take(&mut tasks.running)
            .into_iter()
            .partition(|(_, h)| h.is_finished());
        tasks.running = running;
        tasks.running.push((label, handle));
        for (label, handle) in finished {
            // A finished handle resolves on its first poll.
            if let Some(outcome) = handle.now_or_never() {
                report(label, outcome);
            }
            tasks.reaped += 1;
        }
    }

    /// Number of registered tasks still running.
    pub fn pending(&self) -> usize {
        self.tasks()
            .running
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .count()
    }

    /// Wait for every registered task, including tasks registered while
    /// waiting. Returns how many tasks were awaited.
    pub async fn settle(&self) -> usize {
        let mut settled = 0;
        loop {
            let batch = {
                let mut tasks = self.tasks();
                settled += std::mem::take(&mut tasks.reaped);
                std::mem::take(&mut tasks.running)
            };
            if batch.is_empty() {
                break;
            }
            for (label, handle) in batch {
                report(label, handle.await);
                settled += 1;
            }
        }
        debug!(settled, "Keep-alive settled");
        settled
    }
}
