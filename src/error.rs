use crate::signal::AbortReason;
use std::fmt;
use std::sync::Arc;

/// Unwind produced when a signal a task depends on aborts.
///
/// This is the expected way for a superseded task to end. It converts into
/// `anyhow::Error` through `?`, and the task runner recognizes it again by
/// downcasting, so effects can propagate cancellation without special casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task aborted: {reason}")]
pub struct TaskAbort {
    reason: AbortReason,
}

impl TaskAbort {
    pub const fn new(reason: AbortReason) -> Self {
        Self { reason }
    }

    pub const fn reason(&self) -> AbortReason {
        self.reason
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("the original state is only readable before the effect first suspends")]
    OriginalStateExpired,
}

/// Which boundary caught a [`ListenerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaisedBy {
    Predicate,
    Effect,
}

impl fmt::Display for RaisedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaisedBy::Predicate => f.write_str("predicate"),
            RaisedBy::Effect => f.write_str("effect"),
        }
    }
}

/// A failure caught while matching or running a listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener predicate failed: {0:#}")]
    Predicate(anyhow::Error),
    #[error("listener effect failed: {0:#}")]
    Effect(anyhow::Error),
}

impl ListenerError {
    pub fn raised_by(&self) -> RaisedBy {
        match self {
            ListenerError::Predicate(_) => RaisedBy::Predicate,
            ListenerError::Effect(_) => RaisedBy::Effect,
        }
    }

    pub fn error(&self) -> &anyhow::Error {
        match self {
            ListenerError::Predicate(err) | ListenerError::Effect(err) => err,
        }
    }
}

pub type ErrorHandler = Arc<dyn Fn(&ListenerError) + Send + Sync>;

pub(crate) fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &ListenerError| {
        tracing::error!(raised_by = %err.raised_by(), error = ?err.error(), "listener error");
    })
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "Box<dyn Any>"
    }
}
