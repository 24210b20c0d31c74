use crate::error::{TaskAbort, panic_message};
use crate::signal::{AbortReason, Signal};
use crate::suspend::race_with_signal;
use crate::wait_group::WaitGroup;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Outcome of one task: a listener invocation or a fork.
#[derive(Debug)]
pub enum TaskResult<T> {
    Ok(T),
    Rejected(anyhow::Error),
    Cancelled(AbortReason),
}

impl<T> TaskResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskResult::Ok(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TaskResult::Rejected(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskResult::Cancelled(_))
    }

    pub fn cancel_reason(&self) -> Option<AbortReason> {
        match self {
            TaskResult::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Collapses into a `Result`; cancellation becomes a [`TaskAbort`] error.
    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            TaskResult::Ok(value) => Ok(value),
            TaskResult::Rejected(err) => Err(err),
            TaskResult::Cancelled(reason) => Err(TaskAbort::new(reason).into()),
        }
    }
}

/// Runs a task body under `signal` and reports a [`TaskResult`].
///
/// Aborts `signal` with [`AbortReason::SelfCompleted`] once the body is done.
pub async fn run_task<T, F>(signal: Signal, body: F) -> TaskResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    TaskRunner::new(signal, AbortReason::SelfCompleted)
        .run(body)
        .await
}

/// Executes one task body and owns its terminal abort.
pub(crate) struct TaskRunner {
    signal: Signal,
    completion: AbortReason,
    joins: WaitGroup,
}

impl TaskRunner {
    pub(crate) fn new(signal: Signal, completion: AbortReason) -> Self {
        Self {
            signal,
            completion,
            joins: WaitGroup::default(),
        }
    }

    /// Auto-joined forks register here; the completion abort waits for them.
    pub(crate) fn joins(&self) -> &WaitGroup {
        &self.joins
    }

    pub(crate) async fn run<T, F>(self, body: F) -> TaskResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let completion = CompleteOnDrop(&self.signal, self.completion);
        let result = execute(&self.signal, body).await;
        self.joins.wait().await;
        drop(completion);
        result
    }
}

async fn execute<T, F>(signal: &Signal, body: F) -> TaskResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if let Some(reason) = signal.reason() {
        return TaskResult::Cancelled(reason);
    }

    let body = AssertUnwindSafe(body).catch_unwind();
    match race_with_signal(signal, body).await {
        Err(abort) => TaskResult::Cancelled(abort.reason()),
        Ok(Err(panic)) => TaskResult::Rejected(anyhow::anyhow!(
            "task panicked: {}",
            panic_message(panic.as_ref())
        )),
        Ok(Ok(Ok(value))) => match signal.reason() {
            Some(reason) => TaskResult::Cancelled(reason),
            None => TaskResult::Ok(value),
        },
        Ok(Ok(Err(err))) => match err.downcast_ref::<TaskAbort>() {
            Some(abort) => TaskResult::Cancelled(abort.reason()),
            None => TaskResult::Rejected(err),
        },
    }
}

/// Fires the completion abort even when the runner future is dropped early.
struct CompleteOnDrop<'a>(&'a Signal, AbortReason);

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        self.0.abort(self.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fork::{ForkApi, ForkOptions, fork};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    async fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    #[tokio::test(start_paused = true)]
    async fn ok_result_then_completion_abort() {
        let signal = Signal::new();
        let result = run_task(signal.clone(), async { anyhow::Ok(5) }).await;

        assert!(matches!(result, TaskResult::Ok(5)));
        assert_eq!(signal.reason(), Some(AbortReason::SelfCompleted));
    }

    #[tokio::test(start_paused = true)]
    async fn pre_aborted_signal_never_polls_body() {
        let signal = Signal::new();
        signal.abort(AbortReason::ListenerCancelled);

        let polled = Arc::new(AtomicBool::new(false));
        let polled_clone = polled.clone();
        let result = run_task(signal, async move {
            polled_clone.store(true, Ordering::SeqCst);
            anyhow::Ok(())
        })
        .await;

        assert_eq!(result.cancel_reason(), Some(AbortReason::ListenerCancelled));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn plain_errors_are_rejected() {
        let signal = Signal::new();
        let result: TaskResult<()> = run_task(signal.clone(), async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;

        match result {
            TaskResult::Rejected(err) => assert_eq!(err.to_string(), "boom"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(signal.reason(), Some(AbortReason::SelfCompleted));
    }

    #[tokio::test(start_paused = true)]
    async fn task_abort_errors_are_cancellations() {
        let signal = Signal::new();
        let result: TaskResult<()> = run_task(signal, async {
            Err::<(), anyhow::Error>(TaskAbort::new(AbortReason::ParentCancelled).into())
        })
        .await;

        assert_eq!(result.cancel_reason(), Some(AbortReason::ParentCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_rejected_and_still_complete() {
        let signal = Signal::new();
        let result = run_task(signal.clone(), explode()).await;

        match result {
            TaskResult::Rejected(err) => assert!(err.to_string().contains("kaboom")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(signal.reason(), Some(AbortReason::SelfCompleted));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_mid_flight_interrupts_body() {
        let signal = Signal::new();
        let aborter = signal.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            aborter.abort(AbortReason::ListenerCancelled);
        });

        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        let result = run_task(signal.clone(), async move {
            sleep(Duration::from_millis(50)).await;
            finished_clone.store(true, Ordering::SeqCst);
            anyhow::Ok(())
        })
        .await;

        assert_eq!(result.cancel_reason(), Some(AbortReason::ListenerCancelled));
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(signal.reason(), Some(AbortReason::ListenerCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_runner_still_completes_signal() {
        let signal = Signal::new();
        let runner = run_task(signal.clone(), async {
            sleep(Duration::from_secs(1)).await;
            anyhow::Ok(())
        });

        let _ = tokio::time::timeout(Duration::from_millis(5), runner).await;
        assert_eq!(signal.reason(), Some(AbortReason::SelfCompleted));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_join_defers_parent_completion() {
        let parent = Signal::new();
        let runner = TaskRunner::new(parent.clone(), AbortReason::SelfCompleted);
        let joins = runner.joins().clone();
        let child_done = Arc::new(AtomicBool::new(false));

        let body_parent = parent.clone();
        let child_flag = child_done.clone();
        let body = async move {
            let _child = fork(
                &body_parent,
                &joins,
                move |api: ForkApi| async move {
                    api.delay(Duration::from_millis(20)).await?;
                    child_flag.store(true, Ordering::SeqCst);
                    anyhow::Ok(())
                },
                ForkOptions::auto_join(),
            );
            anyhow::Ok(())
        };
        let handle = tokio::spawn(runner.run(body));

        sleep(Duration::from_millis(10)).await;
        assert!(!parent.is_aborted());
        assert!(!child_done.load(Ordering::SeqCst));

        sleep(Duration::from_millis(15)).await;
        assert!(child_done.load(Ordering::SeqCst));
        assert_eq!(parent.reason(), Some(AbortReason::SelfCompleted));
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_fork_does_not_defer_parent_completion() {
        let parent = Signal::new();
        let runner = TaskRunner::new(parent.clone(), AbortReason::SelfCompleted);
        let joins = runner.joins().clone();
        let child_done = Arc::new(AtomicBool::new(false));

        let body_parent = parent.clone();
        let child_flag = child_done.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let body = async move {
            let child = fork(
                &body_parent,
                &joins,
                move |api: ForkApi| async move {
                    api.delay(Duration::from_millis(20)).await?;
                    child_flag.store(true, Ordering::SeqCst);
                    anyhow::Ok(())
                },
                ForkOptions::default(),
            );
            let _ = tx.send(child.signal().clone());
            anyhow::Ok(())
        };
        runner.run(body).await;
        assert_eq!(parent.reason(), Some(AbortReason::SelfCompleted));

        let child_signal = rx.await.unwrap();
        assert_eq!(child_signal.reason(), Some(AbortReason::ParentCompleted));

        sleep(Duration::from_millis(30)).await;
        assert!(!child_done.load(Ordering::SeqCst));
    }
}
