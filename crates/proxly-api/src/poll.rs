// Deadline-bounded polling.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::warn;

/// What a single probe observed.
#[derive(Debug)]
pub enum Probe<T, E> {
    /// The awaited condition holds.
    Ready(T),
    /// Not there yet; probe again after the interval.
    Pending,
    /// The probe failed in a way worth tolerating until the deadline.
    Transient(E),
}

/// Why polling stopped without a result.
#[derive(Debug)]
pub enum PollError<E> {
    /// The probe returned a non-transient error.
    Aborted(E),
    /// The deadline passed. Carries the most recent tolerated failure.
    DeadlineExceeded { last_error: Option<E> },
}

/// Run `probe` every `interval` until it is ready or `timeout` elapses.
///
/// Each probe is itself cut off at the deadline, so a hung request cannot
/// outlive it. Transient failures are logged and remembered; an `Err` from
/// the probe aborts immediately.
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T, E>, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    loop {
        match timeout_at(deadline, probe()).await {
            Err(_) => return Err(PollError::DeadlineExceeded { last_error }),
            Ok(Err(e)) => return Err(PollError::Aborted(e)),
            Ok(Ok(Probe::Ready(value))) => return Ok(value),
            Ok(Ok(Probe::Pending)) => {}
            Ok(Ok(Probe::Transient(e))) => {
                warn!(error = %e, "poll probe failed, retrying");
                last_error = Some(e);
            }
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            sleep_until(deadline).await;
            return Err(PollError::DeadlineExceeded { last_error });
        }
        sleep_until(next).await;
    }
}
