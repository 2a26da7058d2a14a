//! Handles for background tasks.
//!
//! The coalescer ticker and the dispatcher loop both run as tokio tasks that
//! only stop when asked to. Dropping a [`TaskHandle`] does NOT stop the task;
//! call [`TaskHandle::shutdown`] for an orderly stop.

use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Error returned when shutting down a background task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownError {
    /// The task panicked before it could stop
    TaskPanicked,
    /// The task was cancelled by the runtime
    TaskCancelled,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "background task panicked"),
            ShutdownError::TaskCancelled => write!(f, "background task was cancelled"),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Shutdown request as seen from inside the task.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
    detached: bool,
}

impl ShutdownSignal {
    /// Wait until shutdown is requested.
    ///
    /// Never completes if the handle was dropped without requesting shutdown.
    pub async fn requested(&mut self) {
        if !self.detached {
            match (&mut self.rx).await {
                Ok(()) => return,
                Err(_) => self.detached = true,
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Handle to a running background task.
#[derive(Debug)]
pub struct TaskHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` on the current tokio runtime.
    ///
    /// The task receives a [`ShutdownSignal`] it should select on.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let signal = ShutdownSignal {
            rx,
            detached: false,
        };
        Self {
            shutdown: Some(tx),
            join: tokio::spawn(task(signal)),
        }
    }

    /// Ask the task to stop and wait until it has.
    ///
    /// # Errors
    /// Returns an error if the task panicked or was cancelled.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown.take() {
            // The task may already have finished on its own.
            let _ = tx.send(());
        }

        self.join.await.map_err(|e| {
            if e.is_panic() {
                ShutdownError::TaskPanicked
            } else {
                ShutdownError::TaskCancelled
            }
        })
    }

    /// Check whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
