use crossbeam_utils::CachePadded;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts outstanding guards and lets callers wait until none are left.
///
/// Used for auto-joined forks (the parent's completion waits on its group) and
/// for draining every in-flight listener invocation.
#[derive(Debug, Default, Clone)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    count: CachePadded<AtomicUsize>,
    notify: Notify,
}

impl WaitGroup {
    pub fn add(&self) -> GroupGuard {
        self.inner.count.fetch_add(1, Ordering::Relaxed);
        GroupGuard(self.inner.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps its [`WaitGroup`] busy until dropped.
#[derive(Debug)]
pub struct GroupGuard(Arc<Inner>);

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.notify.notify_waiters();
        }
    }
}
