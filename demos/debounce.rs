//! Debouncing a Burst of Events
//!
//! A search box dispatches one `Typed` action per keystroke. The listener
//! cancels whatever earlier invocations are still waiting, then sleeps; only
//! the invocation for the last keystroke lives long enough to run the search.
use evtask::{Action, Close, ListenerApi, ListenerMiddleware, Listener, ReducerStore, Trigger, from_fn};
use std::time::Duration;

#[derive(Debug, Clone)]
enum SearchAction {
    Typed(char),
}

impl Action for SearchAction {
    fn kind(&self) -> &str {
        match self {
            SearchAction::Typed(_) => "typed",
        }
    }
}

type SearchStore = ReducerStore<String, SearchAction>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // 1. A store whose state is the current query
    let store = SearchStore::new(String::new(), |query, action| match action {
        SearchAction::Typed(c) => format!("{query}{c}"),
    });
    let middleware = ListenerMiddleware::new(store);

    // 2. Debounced listener: supersede older invocations, then wait quietly
    middleware.start_listening(Listener::new(
        Trigger::kind("typed"),
        from_fn(|_, api: ListenerApi<SearchStore>| async move {
            api.cancel_active_listeners();
            api.delay(Duration::from_millis(150)).await?;
            println!("[Search] querying for {:?}", api.get_state());
            anyhow::Ok(())
        }),
    ));

    // 3. A burst of keystrokes, then a pause, then one more
    for c in "rust".chars() {
        middleware.dispatch(SearchAction::Typed(c));
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    middleware.dispatch(SearchAction::Typed('!'));

    // 4. Let the last search finish, then shut down
    tokio::time::sleep(Duration::from_millis(300)).await;
    middleware.close().await;
}
