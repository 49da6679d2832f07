//! Named background tasks owned by the orchestrator.
//!
//! Each task is spawned with a name so shutdown can report which one got
//! stuck. [`TaskSupervisor::join_all`] waits for every task with one shared
//! deadline and aborts whatever is still running when it expires.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owns the join handles of long-lived background tasks.
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `fut` onto the runtime and keep its handle.
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("spawning background task: {name}");
        let handle = tokio::spawn(fut);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, handle));
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task, aborting those still running after `timeout`.
    ///
    /// Returns the names of the tasks that had to be aborted.
    pub async fn join_all(&self, timeout: Duration) -> Vec<&'static str> {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = Vec::new();

        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!("background task {name} finished"),
                Ok(Err(e)) if e.is_cancelled() => debug!("background task {name} was cancelled"),
                Ok(Err(e)) => warn!("background task {name} panicked: {e}"),
                Err(_) => {
                    warn!("background task {name} did not stop within {timeout:?}, aborting");
                    handle.abort();
                    aborted.push(name);
                }
            }
        }
        aborted
    }
}
