mod from_fn;

use crate::api::ListenerApi;
use crate::event::Action;
use crate::store::Store;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub use from_fn::*;

/// Normalized matcher: `(event, state after, state before) -> matched?`.
pub(crate) type Predicate<St> = Arc<
    dyn Fn(&<St as Store>::Action, &<St as Store>::State, &<St as Store>::State) -> anyhow::Result<bool>
        + Send
        + Sync,
>;

type MatcherFn<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// What makes a listener fire.
///
/// Whatever the variant, it is folded into one [`Predicate`] when the listener
/// is registered. The variant itself is kept only for identity comparison.
pub enum Trigger<St: Store> {
    /// Events whose [`Action::kind`] equals the tag.
    Kind(Cow<'static, str>),
    /// A predicate over the event alone.
    Matcher(MatcherFn<St::Action>),
    /// A fallible predicate over the event and both state snapshots.
    Predicate(Predicate<St>),
}

impl<St: Store> Trigger<St> {
    pub fn kind(kind: impl Into<Cow<'static, str>>) -> Self {
        Trigger::Kind(kind.into())
    }

    pub fn matcher<F>(f: F) -> Self
    where
        F: Fn(&St::Action) -> bool + Send + Sync + 'static,
    {
        Trigger::Matcher(Arc::new(f))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&St::Action, &St::State, &St::State) -> bool + Send + Sync + 'static,
    {
        Trigger::Predicate(Arc::new(
            move |action: &St::Action, current: &St::State, original: &St::State| {
                anyhow::Ok(f(action, current, original))
            },
        ))
    }

    /// A predicate that may fail; failures are reported and count as no match.
    pub fn try_predicate<F>(f: F) -> Self
    where
        F: Fn(&St::Action, &St::State, &St::State) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Trigger::Predicate(Arc::new(f))
    }

    pub(crate) fn same(&self, other: &Trigger<St>) -> bool {
        match (self, other) {
            (Trigger::Kind(a), Trigger::Kind(b)) => a == b,
            (Trigger::Matcher(a), Trigger::Matcher(b)) => Arc::ptr_eq(a, b),
            (Trigger::Predicate(a), Trigger::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn to_predicate(&self) -> Predicate<St> {
        match self {
            Trigger::Kind(kind) => {
                let kind = kind.clone();
                Arc::new(move |action: &St::Action, _: &St::State, _: &St::State| {
                    anyhow::Ok(action.kind() == kind)
                })
            }
            Trigger::Matcher(matcher) => {
                let matcher = matcher.clone();
                Arc::new(move |action: &St::Action, _: &St::State, _: &St::State| {
                    anyhow::Ok(matcher(action))
                })
            }
            Trigger::Predicate(predicate) => predicate.clone(),
        }
    }
}

impl<St: Store> Clone for Trigger<St> {
    fn clone(&self) -> Self {
        match self {
            Trigger::Kind(kind) => Trigger::Kind(kind.clone()),
            Trigger::Matcher(matcher) => Trigger::Matcher(matcher.clone()),
            Trigger::Predicate(predicate) => Trigger::Predicate(predicate.clone()),
        }
    }
}

impl<St: Store> fmt::Debug for Trigger<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            Trigger::Matcher(_) => f.write_str("Matcher(..)"),
            Trigger::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

type EffectFn<St> = Arc<
    dyn Fn(Arc<<St as Store>::Action>, ListenerApi<St>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// The body run for every matching event.
///
/// Identity matters: clones of one `Effect` are the same effect, two
/// `Effect::new` calls on the same closure are not.
pub struct Effect<St: Store>(EffectFn<St>);

impl<St: Store> Effect<St> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<St::Action>, ListenerApi<St>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Effect(Arc::new(move |action, api| f(action, api).boxed()))
    }

    pub(crate) fn call(
        &self,
        action: Arc<St::Action>,
        api: ListenerApi<St>,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.0)(action, api)
    }

    pub(crate) fn ptr_eq(&self, other: &Effect<St>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<St: Store> Clone for Effect<St> {
    fn clone(&self) -> Self {
        Effect(self.0.clone())
    }
}

impl<St: Store> fmt::Debug for Effect<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect(..)")
    }
}

/// A registration: a trigger and the effect it launches.
pub struct Listener<St: Store> {
    pub(crate) trigger: Trigger<St>,
    pub(crate) effect: Effect<St>,
    pub(crate) once: bool,
}

impl<St: Store> Listener<St> {
    pub fn new(trigger: Trigger<St>, effect: Effect<St>) -> Self {
        Self {
            trigger,
            effect,
            once: false,
        }
    }

    /// A listener that is removed by the first event it matches, before its
    /// effect is launched.
    pub(crate) fn once(trigger: Trigger<St>, effect: Effect<St>) -> Self {
        Self {
            trigger,
            effect,
            once: true,
        }
    }

    pub fn trigger(&self) -> &Trigger<St> {
        &self.trigger
    }

    pub fn effect(&self) -> &Effect<St> {
        &self.effect
    }

    pub(crate) fn same(&self, trigger: &Trigger<St>, effect: &Effect<St>) -> bool {
        self.effect.ptr_eq(effect) && self.trigger.same(trigger)
    }
}

impl<St: Store> Clone for Listener<St> {
    fn clone(&self) -> Self {
        Self {
            trigger: self.trigger.clone(),
            effect: self.effect.clone(),
            once: self.once,
        }
    }
}

impl<St: Store> fmt::Debug for Listener<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("trigger", &self.trigger)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}
