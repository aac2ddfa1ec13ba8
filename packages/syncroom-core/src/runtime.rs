//! Task spawning abstraction.
//!
//! Download jobs are started through a [`TaskSpawner`], so the download
//! service never calls `tokio::spawn` directly and tests run jobs on the
//! runtime that drives the test.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// Tasks are fire-and-forget: the spawner does not provide a way to cancel
/// or join them. Long-running tasks watch their own cancellation token.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a spawner bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
