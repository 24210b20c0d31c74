use crate::event::Action;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// The event/state container the middleware sits in front of.
///
/// The middleware reads `state()` before and after `dispatch`, so `dispatch`
/// must have applied the action by the time it returns.
pub trait Store: Send + Sync + 'static {
    type State: Send + Sync + 'static;
    type Action: Action;
    type Output;

    fn dispatch(&self, action: &Self::Action) -> Self::Output;

    fn state(&self) -> Arc<Self::State>;
}

type Reducer<S, A> = Box<dyn Fn(&S, &A) -> S + Send + Sync>;

/// A minimal store that folds every action through a reducer function.
pub struct ReducerStore<S, A> {
    state: Mutex<Arc<S>>,
    reducer: Reducer<S, A>,
}

impl<S, A> ReducerStore<S, A> {
    pub fn new<F>(initial: S, reducer: F) -> Self
    where
        F: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(Arc::new(initial)),
            reducer: Box::new(reducer),
        }
    }
}

impl<S, A> Store for ReducerStore<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    type State = S;
    type Action = A;
    type Output = Arc<S>;

    fn dispatch(&self, action: &A) -> Arc<S> {
        let mut state = self.state.lock();
        *state = Arc::new((self.reducer)(&state, action));
        state.clone()
    }

    fn state(&self) -> Arc<S> {
        self.state.lock().clone()
    }
}

impl<S: fmt::Debug, A> fmt::Debug for ReducerStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerStore")
            .field("state", &self.state.lock())
            .finish_non_exhaustive()
    }
}
