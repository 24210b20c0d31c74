use crate::error::TaskAbort;
use crate::signal::{AbortReason, Signal};
use crate::suspend;
use crate::task::{TaskResult, TaskRunner};
use crate::wait_group::WaitGroup;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkOptions {
    /// Hold the parent's completion until this child settles.
    pub auto_join: bool,
}

impl ForkOptions {
    pub fn auto_join() -> Self {
        Self { auto_join: true }
    }
}

/// What a forked executor can do: suspend under its own signal.
#[derive(Debug, Clone)]
pub struct ForkApi {
    signal: Signal,
}

impl ForkApi {
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub async fn pause<F: Future>(&self, operation: F) -> Result<F::Output, TaskAbort> {
        suspend::pause(&self.signal, operation).await
    }

    pub async fn delay(&self, duration: Duration) -> Result<(), TaskAbort> {
        suspend::delay(&self.signal, duration).await
    }
}

/// Handle to a forked child task.
///
/// Awaiting the handle yields the child's [`TaskResult`], or
/// `Cancelled(ParentCancelled | ParentCompleted)` if the parent's signal aborts
/// first. Dropping the handle detaches the child without cancelling it.
pub struct ForkHandle<T> {
    result: BoxFuture<'static, TaskResult<T>>,
    signal: Signal,
}

impl<T> ForkHandle<T> {
    /// Aborts the child with [`AbortReason::TaskCancelled`].
    pub fn cancel(&self) {
        self.signal.abort(AbortReason::TaskCancelled);
    }

    /// The child's own signal.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }
}

impl<T> Future for ForkHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().result.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for ForkHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkHandle")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

/// Spawns `executor` as a child of `parent`.
///
/// The executor never runs inside this call; it is spawned onto the runtime
/// and first polled on a later tick. With `auto_join`, the child keeps a guard
/// on `joins` until it settles.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub(crate) fn fork<T, F, Fut>(
    parent: &Signal,
    joins: &WaitGroup,
    executor: F,
    options: ForkOptions,
) -> ForkHandle<T>
where
    T: Send + 'static,
    F: FnOnce(ForkApi) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let child = parent.child();
    let api = ForkApi {
        signal: child.clone(),
    };
    let join_guard = options.auto_join.then(|| joins.add());
    let runner = TaskRunner::new(child.clone(), AbortReason::TaskCompleted);

    let join = tokio::spawn(async move {
        let result = runner.run(async move { executor(api).await }).await;
        drop(join_guard);
        result
    });

    let parent = parent.clone();
    let result = async move {
        let mut join = join;
        // A child that has already settled wins over the parent's abort.
        let joined = tokio::select! {
            biased;
            joined = &mut join => joined,
            _ = parent.cancelled() => {
                return TaskResult::Cancelled(parent.abort_error().reason().inherited());
            }
        };
        joined.unwrap_or_else(|join_err| TaskResult::Rejected(anyhow::Error::new(join_err)))
    }
    .boxed();

    tracing::trace!(auto_join = options.auto_join, "forked child task");

    ForkHandle {
        result,
        signal: child,
    }
}
