use crate::error::TaskAbort;
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a [`Signal`] was aborted.
///
/// The variant names which entity initiated the abort and whether it was a
/// cancellation or a normal completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    SelfCancelled,
    SelfCompleted,
    ListenerCancelled,
    ListenerCompleted,
    ParentCancelled,
    ParentCompleted,
    TaskCancelled,
    TaskCompleted,
}

impl AbortReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            AbortReason::SelfCancelled => "self-cancelled",
            AbortReason::SelfCompleted => "self-completed",
            AbortReason::ListenerCancelled => "listener-cancelled",
            AbortReason::ListenerCompleted => "listener-completed",
            AbortReason::ParentCancelled => "parent-cancelled",
            AbortReason::ParentCompleted => "parent-completed",
            AbortReason::TaskCancelled => "task-cancelled",
            AbortReason::TaskCompleted => "task-completed",
        }
    }

    /// `true` for the `*Completed` reasons.
    pub const fn is_completion(self) -> bool {
        matches!(
            self,
            AbortReason::SelfCompleted
                | AbortReason::ListenerCompleted
                | AbortReason::ParentCompleted
                | AbortReason::TaskCompleted
        )
    }

    /// The reason a child observes when its parent aborts with `self`.
    pub const fn inherited(self) -> AbortReason {
        if self.is_completion() {
            AbortReason::ParentCompleted
        } else {
            AbortReason::ParentCancelled
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Callback = Box<dyn FnOnce(AbortReason) + Send>;

#[derive(Default)]
struct State {
    reason: Option<AbortReason>,
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    token: CancellationToken,
    /// Held by a child until it aborts; dropping it unhooks the child from its parent.
    parent: Mutex<Option<Subscription>>,
}

/// A node of the cancellation tree.
///
/// Cloning a `Signal` yields another handle to the same node. Aborting is
/// idempotent: the first [`abort`](Signal::abort) fixes the reason for good.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal that aborts whenever `self` aborts.
    ///
    /// The child receives the parent's reason through [`AbortReason::inherited`].
    /// Aborting the child never touches the parent.
    pub fn child(&self) -> Signal {
        let child = Signal::new();
        let weak = Arc::downgrade(&child.inner);
        let subscription = self.on_abort(move |reason| {
            if let Some(inner) = weak.upgrade() {
                Signal { inner }.abort(reason.inherited());
            }
        });
        if !child.is_aborted() {
            *child.inner.parent.lock() = Some(subscription);
        }
        child
    }

    /// Aborts the signal, returning `false` if it was already aborted.
    ///
    /// Subscribers run synchronously, in registration order, after the reason
    /// has been recorded.
    pub fn abort(&self, reason: AbortReason) -> bool {
        let subscribers = {
            let mut state = self.inner.state.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason);
            mem::take(&mut state.subscribers)
        };

        self.inner.token.cancel();
        drop(self.inner.parent.lock().take());

        for (_, callback) in subscribers {
            callback(reason);
        }
        true
    }

    /// Registers `callback` to run once when the signal aborts.
    ///
    /// Runs `callback` immediately if the signal is already aborted. Dropping
    /// the returned [`Subscription`] unregisters the callback.
    pub fn on_abort<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce(AbortReason) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if let Some(reason) = state.reason {
            drop(state);
            callback(reason);
            return Subscription::inert();
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, Box::new(callback)));

        Subscription {
            signal: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.state.lock().reason.is_some()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.state.lock().reason
    }

    pub fn throw_if_aborted(&self) -> Result<(), TaskAbort> {
        match self.reason() {
            Some(reason) => Err(TaskAbort::new(reason)),
            None => Ok(()),
        }
    }

    /// Completes once the signal is aborted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    pub(crate) fn abort_error(&self) -> TaskAbort {
        // `cancelled()` only resolves after the reason is recorded.
        TaskAbort::new(self.reason().unwrap_or(AbortReason::SelfCancelled))
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

/// Registration returned by [`Signal::on_abort`]; unregisters on drop.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    signal: Weak<Inner>,
    id: u64,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            signal: Weak::new(),
            id: 0,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.signal.upgrade() {
            inner
                .state
                .lock()
                .subscribers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn abort_is_idempotent_and_keeps_first_reason() {
        let signal = Signal::new();
        assert!(!signal.is_aborted());

        assert!(signal.abort(AbortReason::TaskCancelled));
        assert!(!signal.abort(AbortReason::SelfCompleted));

        assert_eq!(signal.reason(), Some(AbortReason::TaskCancelled));
        assert_eq!(
            signal.throw_if_aborted(),
            Err(TaskAbort::new(AbortReason::TaskCancelled))
        );
    }

    #[test]
    fn subscribers_run_once_in_registration_order() {
        let signal = Signal::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..3)
            .map(|i| {
                let order = order.clone();
                signal.on_abort(move |reason| order.lock().push((i, reason)))
            })
            .collect();

        signal.abort(AbortReason::ListenerCancelled);
        signal.abort(AbortReason::ListenerCancelled);
        drop(subs);

        let reason = AbortReason::ListenerCancelled;
        assert_eq!(*order.lock(), vec![(0, reason), (1, reason), (2, reason)]);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn on_abort_fires_immediately_when_already_aborted() {
        let signal = Signal::new();
        signal.abort(AbortReason::SelfCompleted);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let _sub = signal.on_abort(move |reason| {
            assert_eq!(reason, AbortReason::SelfCompleted);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_is_not_notified() {
        let signal = Signal::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let sub = signal.on_abort(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(signal.subscriber_count(), 1);
        drop(sub);
        assert_eq!(signal.subscriber_count(), 0);

        signal.abort(AbortReason::SelfCancelled);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parent_abort_cascades_with_inherited_reason() {
        let parent = Signal::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.abort(AbortReason::ListenerCancelled);

        assert_eq!(child.reason(), Some(AbortReason::ParentCancelled));
        assert_eq!(grandchild.reason(), Some(AbortReason::ParentCancelled));

        let parent = Signal::new();
        let child = parent.child();
        parent.abort(AbortReason::SelfCompleted);
        assert_eq!(child.reason(), Some(AbortReason::ParentCompleted));
    }

    #[test]
    fn child_abort_does_not_reach_parent_and_unhooks() {
        let parent = Signal::new();
        let child = parent.child();
        assert_eq!(parent.subscriber_count(), 1);

        child.abort(AbortReason::TaskCancelled);

        assert!(!parent.is_aborted());
        assert_eq!(parent.subscriber_count(), 0);
    }

    #[test]
    fn child_of_aborted_parent_starts_aborted() {
        let parent = Signal::new();
        parent.abort(AbortReason::TaskCompleted);

        let child = parent.child();
        assert_eq!(child.reason(), Some(AbortReason::ParentCompleted));
    }

    #[test]
    fn dropping_child_releases_parent_slot() {
        let parent = Signal::new();
        let child = parent.child();
        drop(child);

        assert_eq!(parent.subscriber_count(), 0);
        assert!(parent.abort(AbortReason::SelfCancelled));
    }

    #[tokio::test]
    async fn cancelled_resolves_after_abort() {
        let signal = Signal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.reason()
        });

        tokio::task::yield_now().await;
        signal.abort(AbortReason::TaskCancelled);

        assert_eq!(handle.await.unwrap(), Some(AbortReason::TaskCancelled));
    }
}
