mod api;
mod error;
mod event;
mod fork;
mod handle;
mod launcher;
mod lifecycle;
mod listener;
mod middleware;
mod registry;
mod signal;
mod store;
mod suspend;
mod take;
mod task;
mod wait_group;

#[cfg(test)]
mod test_utils;

pub use {
    api::ListenerApi,
    error::{Error, ErrorHandler, ListenerError, RaisedBy, TaskAbort},
    event::Action,
    fork::{ForkApi, ForkHandle, ForkOptions},
    handle::Unsubscribe,
    lifecycle::{Close, Drain},
    listener::*,
    middleware::{Builder, Dispatched, ListenerMiddleware, Message},
    registry::ListenerId,
    signal::{AbortReason, Signal, Subscription},
    store::{ReducerStore, Store},
    suspend::{delay, pause, race_with_signal},
    take::Taken,
    task::{TaskResult, run_task},
};
