use crate::error::TaskAbort;
use crate::signal::Signal;
use std::time::Duration;

/// Resolves with `operation`'s output, or with [`TaskAbort`] as soon as
/// `signal` aborts.
///
/// An already-aborted signal short-circuits without polling `operation`.
/// Whichever side loses the race is dropped before this returns.
pub async fn race_with_signal<F: Future>(
    signal: &Signal,
    operation: F,
) -> Result<F::Output, TaskAbort> {
    signal.throw_if_aborted()?;

    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(signal.abort_error()),
        output = operation => Ok(output),
    }
}

/// Like [`race_with_signal`], but also rejects an output that arrived in the
/// same poll the signal aborted.
pub async fn pause<F: Future>(signal: &Signal, operation: F) -> Result<F::Output, TaskAbort> {
    let output = race_with_signal(signal, operation).await?;
    signal.throw_if_aborted()?;
    Ok(output)
}

/// Sleeps for `duration` unless `signal` aborts first.
pub async fn delay(signal: &Signal, duration: Duration) -> Result<(), TaskAbort> {
    pause(signal, tokio::time::sleep(duration)).await
}
