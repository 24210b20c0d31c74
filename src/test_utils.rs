//! Fixtures shared by the unit tests.

use crate::event::Action;
use crate::middleware::ListenerMiddleware;
use crate::store::ReducerStore;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Installs a trace-level subscriber that writes through the test harness.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestAction {
    Add(i64),
    Named(&'static str),
}

impl Action for TestAction {
    fn kind(&self) -> &str {
        match self {
            TestAction::Add(_) => "add",
            TestAction::Named(name) => name,
        }
    }
}

pub type CounterStore = ReducerStore<i64, TestAction>;

pub fn counter_store() -> CounterStore {
    ReducerStore::new(0, |state: &i64, action: &TestAction| match action {
        TestAction::Add(n) => state + n,
        TestAction::Named(_) => *state,
    })
}

pub fn counter_middleware() -> ListenerMiddleware<CounterStore> {
    init_test_logging();
    ListenerMiddleware::new(counter_store())
}
