//! Task spawning abstraction for runtime independence.
//!
//! Services hold an `Arc<dyn TaskSpawner>` so the session actor, its
//! initialization cycles, and periodic probing can be driven by whatever
//! runtime the host embeds (a plain Tokio runtime for the headless player,
//! the host's own executor on other surfaces).

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// Abstraction for spawning background tasks.
///
/// The trait is object safe: futures are boxed at the call site. Use the
/// [`TaskSpawnerExt`] helpers to avoid boxing by hand.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a boxed future as a detached background task.
    ///
    /// The spawner does not provide a way to join the task. Cancellation is
    /// cooperative, through a [`CancellationToken`] the future observes.
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>);
}

/// Convenience helpers available on every [`TaskSpawner`], including trait objects.
pub trait TaskSpawnerExt {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Spawns a future that is dropped as soon as `cancel` fires.
    fn spawn_cancellable<F>(&self, cancel: CancellationToken, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

impl<S: TaskSpawner + ?Sized> TaskSpawnerExt for S {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_boxed(future.boxed());
    }

    fn spawn_cancellable<F>(&self, cancel: CancellationToken, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_boxed(
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = future => {}
                }
            }
            .boxed(),
        );
    }
}

/// Tokio-based spawner for the headless player and general use.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) {
        self.handle.spawn(future);
    }
}
