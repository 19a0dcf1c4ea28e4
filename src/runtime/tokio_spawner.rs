//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::scheduler::Spawn;

/// Tokio-based spawner that runs dispatcher and worker tasks on a tokio
/// runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a spawner from an explicit runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Create a spawner for the runtime the caller is already inside.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, as
    /// [`tokio::runtime::Handle::current`] does.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Create a spawner backed by a new multi-threaded runtime with the
    /// given number of worker threads.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;
        Ok(Self {
            handle: Arc::new(runtime.handle().clone()),
        })
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
