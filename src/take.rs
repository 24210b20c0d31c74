use crate::api::ListenerApi;
use crate::error::TaskAbort;
use crate::handle::Unsubscribe;
use crate::listener::{Effect, Listener, Trigger};
use crate::middleware::ListenerMiddleware;
use crate::signal::Signal;
use crate::store::Store;
use crate::suspend::pause;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// A matched event with the state after and before it was reduced.
pub type Taken<St> = (
    Arc<<St as Store>::Action>,
    Arc<<St as Store>::State>,
    Arc<<St as Store>::State>,
);

/// Removes the one-shot listener however `take` ends.
struct OneShot<St: Store>(Unsubscribe<St>);

impl<St: Store> Drop for OneShot<St> {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// Waits for the next event matching `trigger`, racing `timeout` and `signal`.
pub(crate) async fn take<St: Store>(
    middleware: &ListenerMiddleware<St>,
    signal: &Signal,
    trigger: Trigger<St>,
    timeout: Option<Duration>,
) -> Result<Option<Taken<St>>, TaskAbort> {
    signal.throw_if_aborted()?;

    let (tx, rx) = oneshot::channel::<Taken<St>>();
    let tx = Mutex::new(Some(tx));
    let effect = Effect::new(move |action, api: ListenerApi<St>| {
        let claimed = tx.lock().take().map(|tx| (tx, api.get_original_state()));
        async move {
            if let Some((tx, original)) = claimed {
                let _ = tx.send((action, api.matched_state(), original?));
            }
            anyhow::Ok(())
        }
    });
    let _one_shot = OneShot(middleware.start_listening(Listener::once(trigger, effect)));

    // A dropped sender counts as no match.
    let matched = async move { rx.await.ok() };
    match timeout {
        Some(timeout) => {
            pause(signal, async move {
                tokio::time::timeout(timeout, matched).await.ok().flatten()
            })
            .await
        }
        None => pause(signal, matched).await,
    }
}

pub(crate) async fn condition<St: Store>(
    middleware: &ListenerMiddleware<St>,
    signal: &Signal,
    trigger: Trigger<St>,
    timeout: Option<Duration>,
) -> Result<bool, TaskAbort> {
    take(middleware, signal, trigger, timeout)
        .await
        .map(|taken| taken.is_some())
}
