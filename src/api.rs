use crate::error::{Error, TaskAbort};
use crate::fork::{self, ForkApi, ForkHandle, ForkOptions};
use crate::listener::Trigger;
use crate::middleware::{Dispatched, ListenerMiddleware, Message};
use crate::registry::ListenerEntry;
use crate::signal::{AbortReason, Signal};
use crate::store::Store;
use crate::suspend;
use crate::take::{self, Taken};
use crate::wait_group::WaitGroup;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The state captured right before the matching event was reduced.
///
/// Readable only until the effect first suspends.
pub(crate) struct OriginalState<S>(Arc<Mutex<Option<Arc<S>>>>);

impl<S> OriginalState<S> {
    pub(crate) fn new(state: Arc<S>) -> Self {
        Self(Arc::new(Mutex::new(Some(state))))
    }

    pub(crate) fn get(&self) -> Result<Arc<S>, Error> {
        self.0.lock().clone().ok_or(Error::OriginalStateExpired)
    }

    pub(crate) fn expire(&self) {
        self.0.lock().take();
    }
}

impl<S> Clone for OriginalState<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Context handed to every running effect.
///
/// Every suspension helper here is bound to this invocation's [`Signal`], so
/// cancelling the invocation interrupts whatever it is waiting on.
pub struct ListenerApi<St: Store> {
    middleware: ListenerMiddleware<St>,
    entry: Arc<ListenerEntry<St>>,
    seq: u64,
    signal: Signal,
    current: Arc<St::State>,
    original: OriginalState<St::State>,
    joins: WaitGroup,
}

impl<St: Store> ListenerApi<St> {
    pub(crate) fn new(
        middleware: ListenerMiddleware<St>,
        entry: Arc<ListenerEntry<St>>,
        seq: u64,
        signal: Signal,
        current: Arc<St::State>,
        original: OriginalState<St::State>,
        joins: WaitGroup,
    ) -> Self {
        Self {
            middleware,
            entry,
            seq,
            signal,
            current,
            original,
            joins,
        }
    }

    pub fn get_state(&self) -> Arc<St::State> {
        self.middleware.get_state()
    }

    /// The state right after the triggering event was reduced.
    pub(crate) fn matched_state(&self) -> Arc<St::State> {
        self.current.clone()
    }

    /// The state before the event that triggered this invocation.
    ///
    /// Fails with [`Error::OriginalStateExpired`] once the effect has awaited
    /// anything that suspended.
    pub fn get_original_state(&self) -> Result<Arc<St::State>, Error> {
        self.original.get()
    }

    pub fn dispatch(&self, action: St::Action) -> St::Output {
        self.middleware.dispatch(action)
    }

    pub fn dispatch_message(&self, message: Message<St>) -> Dispatched<St> {
        self.middleware.dispatch_message(message)
    }

    /// Waits for the next event accepted by `predicate`.
    ///
    /// Returns `Ok(None)` if `timeout` elapses first.
    pub async fn take<F>(
        &self,
        predicate: F,
        timeout: Option<Duration>,
    ) -> Result<Option<Taken<St>>, TaskAbort>
    where
        F: Fn(&St::Action, &St::State, &St::State) -> bool + Send + Sync + 'static,
    {
        take::take(
            &self.middleware,
            &self.signal,
            Trigger::predicate(predicate),
            timeout,
        )
        .await
    }

    /// Like [`take`](ListenerApi::take), reduced to whether an event matched.
    pub async fn condition<F>(&self, predicate: F, timeout: Option<Duration>) -> Result<bool, TaskAbort>
    where
        F: Fn(&St::Action, &St::State, &St::State) -> bool + Send + Sync + 'static,
    {
        take::condition(
            &self.middleware,
            &self.signal,
            Trigger::predicate(predicate),
            timeout,
        )
        .await
    }

    pub async fn delay(&self, duration: Duration) -> Result<(), TaskAbort> {
        suspend::delay(&self.signal, duration).await
    }

    pub async fn pause<F: Future>(&self, operation: F) -> Result<F::Output, TaskAbort> {
        suspend::pause(&self.signal, operation).await
    }

    /// Spawns a child task under this invocation's signal.
    pub fn fork<T, F, Fut>(&self, executor: F, options: ForkOptions) -> ForkHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(ForkApi) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        fork::fork(&self.signal, &self.joins, executor, options)
    }

    /// Aborts the other invocations of this listener that this one supersedes.
    pub fn cancel_active_listeners(&self) {
        self.entry.cancel_others(self.seq);
    }

    /// Aborts this invocation with [`AbortReason::SelfCancelled`].
    pub fn cancel(&self) {
        self.signal.abort(AbortReason::SelfCancelled);
        self.entry.remove_pending(self.seq);
    }

    pub fn throw_if_cancelled(&self) -> Result<(), TaskAbort> {
        self.signal.throw_if_aborted()
    }

    /// Puts this listener back into the registry if it was removed.
    pub fn subscribe(&self) {
        self.entry.subscribe();
    }

    /// Removes this listener from the registry; running invocations continue.
    pub fn unsubscribe(&self) -> bool {
        self.entry.unsubscribe()
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }
}

impl<St: Store> Clone for ListenerApi<St> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
            entry: self.entry.clone(),
            seq: self.seq,
            signal: self.signal.clone(),
            current: self.current.clone(),
            original: self.original.clone(),
            joins: self.joins.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for ListenerApi<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerApi")
            .field("listener", &self.entry.id())
            .field("seq", &self.seq)
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}
