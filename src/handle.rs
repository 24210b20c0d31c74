use crate::registry::{ListenerEntry, ListenerId};
use crate::signal::AbortReason;
use crate::store::Store;
use std::fmt;
use std::sync::Arc;

/// Handle returned when a listener is registered.
///
/// Dropping it leaves the listener in place; call
/// [`unsubscribe`](Unsubscribe::unsubscribe) to remove it. Registering the
/// same listener twice hands out handles to the same entry.
pub struct Unsubscribe<St: Store> {
    entry: Arc<ListenerEntry<St>>,
}

impl<St: Store> Unsubscribe<St> {
    pub(crate) fn new(entry: Arc<ListenerEntry<St>>) -> Self {
        Self { entry }
    }

    pub fn id(&self) -> ListenerId {
        self.entry.id()
    }

    /// Removes the listener. Returns `false` if it was already gone.
    ///
    /// Invocations that are already running keep running.
    pub fn unsubscribe(&self) -> bool {
        self.entry.unsubscribe()
    }

    /// Removes the listener and aborts its running invocations with
    /// [`AbortReason::ListenerCancelled`].
    pub fn unsubscribe_and_cancel(&self) -> bool {
        let removed = self.entry.unsubscribe();
        self.entry.cancel_pending(AbortReason::ListenerCancelled);
        removed
    }
}

impl<St: Store> Clone for Unsubscribe<St> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for Unsubscribe<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.entry.id())
            .finish()
    }
}
