use futures_util::future::BoxFuture;

/// A type that can spawn task-driver futures.
///
/// Abstracts over the runtime so the engine can be driven by whatever
/// scheduler the surrounding system uses. Spawned futures must be polled
/// without blocking a worker thread per task.
pub trait TaskSpawner: Send + Sync {
    /// Spawns the future onto the scheduler.
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

/// A [`TaskSpawner`] that spawns onto the ambient tokio runtime.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TokioTaskExecutor;

impl TaskSpawner for TokioTaskExecutor {
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::task::spawn(fut);
    }
}
