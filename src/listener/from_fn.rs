use crate::api::ListenerApi;
use crate::listener::Effect;
use crate::store::Store;
use std::sync::Arc;

/// Builds an [`Effect`] from an async closure.
#[inline]
pub fn from_fn<St, F, Fut>(f: F) -> Effect<St>
where
    St: Store,
    F: Fn(Arc<St::Action>, ListenerApi<St>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Effect::new(f)
}
