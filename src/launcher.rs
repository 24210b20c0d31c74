use crate::api::{ListenerApi, OriginalState};
use crate::error::ListenerError;
use crate::middleware::ListenerMiddleware;
use crate::registry::ListenerEntry;
use crate::signal::{AbortReason, Signal};
use crate::store::Store;
use crate::task::{TaskResult, TaskRunner};
use std::sync::Arc;

/// Starts one invocation of a matched listener.
///
/// The entry records the invocation's signal right away, so
/// `cancel_active_listeners` and `stop_listening` can reach it before it runs.
/// The effect itself is spawned and first polled on a later tick. The
/// invocation leaves the pending set once its runner settles.
pub(crate) struct Launcher<St: Store> {
    pub(crate) middleware: ListenerMiddleware<St>,
    pub(crate) entry: Arc<ListenerEntry<St>>,
}

impl<St: Store> Launcher<St> {
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub(crate) fn launch(
        self,
        action: Arc<St::Action>,
        current: Arc<St::State>,
        original: Arc<St::State>,
    ) {
        let Launcher { middleware, entry } = self;

        let signal = Signal::new();
        let seq = entry.add_pending(signal.clone());
        let runner = TaskRunner::new(signal.clone(), AbortReason::SelfCompleted);
        let original = OriginalState::new(original);
        let api = ListenerApi::new(
            middleware.clone(),
            entry.clone(),
            seq,
            signal,
            current,
            original.clone(),
            runner.joins().clone(),
        );
        let in_flight = middleware.track_invocation();

        tokio::spawn(async move {
            let _in_flight = in_flight;
            entry.mark_started(seq);

            let effect = entry.effect().clone();
            let mut body = Box::pin(async move { effect.call(action, api).await });
            let mut original = Some(original);
            let body = futures::future::poll_fn(move |cx| {
                let poll = body.as_mut().poll(cx);
                // Only the first synchronous segment may read the original state.
                if let Some(original) = original.take() {
                    original.expire();
                }
                poll
            });

            let result = runner.run(body).await;
            entry.remove_pending(seq);

            match result {
                TaskResult::Ok(()) => {
                    tracing::trace!(listener = ?entry.id(), seq, "listener invocation completed");
                }
                TaskResult::Cancelled(reason) => {
                    tracing::trace!(listener = ?entry.id(), seq, %reason, "listener invocation cancelled");
                }
                TaskResult::Rejected(err) => {
                    middleware.report(ListenerError::Effect(err));
                }
            }
        });
    }
}
