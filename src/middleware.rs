use crate::error::{ErrorHandler, ListenerError, default_error_handler, panic_message};
use crate::event::Action;
use crate::handle::Unsubscribe;
use crate::launcher::Launcher;
use crate::lifecycle::{Close, Drain};
use crate::listener::Listener;
use crate::registry::Registry;
use crate::signal::AbortReason;
use crate::store::Store;
use crate::wait_group::{GroupGuard, WaitGroup};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Input accepted by [`ListenerMiddleware::dispatch_message`].
///
/// Everything but `Action` is consumed by the middleware and never reaches
/// the store.
pub enum Message<St: Store> {
    Action(St::Action),
    AddListener(Listener<St>),
    RemoveListener {
        listener: Listener<St>,
        cancel_active: bool,
    },
    ClearAllListeners,
}

/// What [`ListenerMiddleware::dispatch_message`] did with a [`Message`].
pub enum Dispatched<St: Store> {
    /// The action reached the store; carries the store's output.
    Forwarded(St::Output),
    Subscribed(Unsubscribe<St>),
    Removed(bool),
    Cleared,
}

struct Inner<St: Store> {
    store: St,
    registry: Arc<Registry<St>>,
    on_error: ErrorHandler,
    in_flight: WaitGroup,
}

/// Sits in front of a [`Store`] and launches listener effects for every
/// dispatched action.
pub struct ListenerMiddleware<St: Store> {
    inner: Arc<Inner<St>>,
}

impl<St: Store> ListenerMiddleware<St> {
    pub fn new(store: St) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: St) -> Builder<St> {
        Builder {
            store,
            on_error: None,
        }
    }

    pub fn store(&self) -> &St {
        &self.inner.store
    }

    pub fn get_state(&self) -> Arc<St::State> {
        self.inner.store.state()
    }

    /// Registers `listener`. Registering the same trigger and effect again
    /// returns a handle to the existing registration.
    pub fn start_listening(&self, listener: Listener<St>) -> Unsubscribe<St> {
        self.inner.registry.start(listener)
    }

    /// Removes the registration with the same trigger and effect as
    /// `listener`, optionally aborting its running invocations.
    pub fn stop_listening(&self, listener: &Listener<St>, cancel_active: bool) -> bool {
        self.inner.registry.stop(listener, cancel_active)
    }

    /// Aborts every running invocation and removes every listener.
    pub fn clear_all_listeners(&self) {
        self.inner.registry.clear(AbortReason::ListenerCancelled);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Reduces `action` in the store, then launches every listener whose
    /// trigger matches.
    ///
    /// Matching happens synchronously, in registration order, against the
    /// listeners registered when this call starts. Effects run later, on their
    /// own tasks; their failures go to the error handler, never to the caller.
    ///
    /// # Panics
    ///
    /// Panics if a listener matches and this is called outside of a tokio
    /// runtime.
    pub fn dispatch(&self, action: St::Action) -> St::Output {
        let original = self.inner.store.state();
        let output = self.inner.store.dispatch(&action);
        let current = self.inner.store.state();
        let action = Arc::new(action);

        let entries = self.inner.registry.snapshot();
        tracing::trace!(kind = action.kind(), listeners = entries.len(), "dispatch");

        for entry in entries {
            let predicate = entry.predicate();
            let matched = panic::catch_unwind(AssertUnwindSafe(|| {
                predicate(action.as_ref(), current.as_ref(), original.as_ref())
            }))
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "predicate panicked: {}",
                    panic_message(panic.as_ref())
                ))
            });

            match matched {
                // A one-shot entry fires for whoever removes it first.
                Ok(true) if entry.is_once() && !entry.unsubscribe() => {}
                Ok(true) => Launcher {
                    middleware: self.clone(),
                    entry,
                }
                .launch(action.clone(), current.clone(), original.clone()),
                Ok(false) => {}
                Err(err) => self.report(ListenerError::Predicate(err)),
            }
        }

        output
    }

    pub fn dispatch_message(&self, message: Message<St>) -> Dispatched<St> {
        match message {
            Message::Action(action) => Dispatched::Forwarded(self.dispatch(action)),
            Message::AddListener(listener) => Dispatched::Subscribed(self.start_listening(listener)),
            Message::RemoveListener {
                listener,
                cancel_active,
            } => Dispatched::Removed(self.stop_listening(&listener, cancel_active)),
            Message::ClearAllListeners => {
                self.clear_all_listeners();
                Dispatched::Cleared
            }
        }
    }

    pub(crate) fn report(&self, err: ListenerError) {
        let handler = &self.inner.on_error;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(&err))) {
            tracing::error!(
                error = %err,
                panic = panic_message(panic.as_ref()),
                "listener error handler panicked"
            );
        }
    }

    pub(crate) fn track_invocation(&self) -> GroupGuard {
        self.inner.in_flight.add()
    }
}

impl<St: Store> Clone for ListenerMiddleware<St> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for ListenerMiddleware<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerMiddleware")
            .field("listeners", &self.inner.registry.len())
            .field("in_flight", &self.inner.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<St: Store> Drain for ListenerMiddleware<St> {
    async fn drain(self) {
        let in_flight = self.inner.in_flight.clone();
        drop(self);
        in_flight.wait().await;
    }
}

impl<St: Store> Close for ListenerMiddleware<St> {
    async fn close(self) {
        tracing::debug!(listeners = self.inner.registry.len(), "closing listener middleware");
        self.inner.registry.clear(AbortReason::ListenerCompleted);
        self.drain().await;
    }
}

pub struct Builder<St: Store> {
    store: St,
    on_error: Option<ErrorHandler>,
}

impl<St: Store> Builder<St> {
    /// Sets the handler that receives predicate and effect failures.
    ///
    /// The default handler logs them with `tracing::error!`.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ListenerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> ListenerMiddleware<St> {
        ListenerMiddleware {
            inner: Arc::new(Inner {
                store: self.store,
                registry: Registry::new(),
                on_error: self.on_error.unwrap_or_else(default_error_handler),
                in_flight: WaitGroup::default(),
            }),
        }
    }
}
