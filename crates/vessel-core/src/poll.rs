//! Poll-until-deadline primitive.
//!
//! Every long-running hypervisor interaction in Vessel is a polling loop:
//! wait for an asynchronous task, wait for a container to start, wait for an
//! address to appear. This module provides the single loop implementation
//! they all share, parameterised by poll interval, transient-error retry
//! delay, and an overall deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Timing parameters for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Sleep between probes that report `Pending`.
    pub interval: Duration,
    /// Sleep after a probe that reports `Transient` before retrying.
    pub retry_delay: Duration,
    /// Overall ceiling; once elapsed the loop fails with `DeadlineExceeded`.
    pub deadline: Duration,
}

/// Outcome of one probe of the polled condition.
#[derive(Debug)]
pub enum PollStep<T, E> {
    /// The condition is met; the loop returns this value.
    Ready(T),
    /// Not there yet; probe again after `interval`.
    Pending,
    /// The probe itself failed transiently (network blip, API hiccup);
    /// retry after `retry_delay` without aborting the loop.
    Transient(E),
    /// Terminal failure; the loop returns this error immediately.
    Abort(E),
}

/// Why a polling loop stopped without producing a value.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("deadline exceeded after {waited:?}")]
    DeadlineExceeded { waited: Duration },

    #[error("{0}")]
    Aborted(E),
}

/// Run `probe` until it is ready, aborts, or the deadline elapses.
///
/// The first probe runs immediately. Transient probe errors are logged and
/// retried; they only surface if the deadline expires first. The loop
/// terminates at the deadline, not before it and not after it (modulo timer
/// resolution).
pub async fn poll_until<T, E, F, Fut>(config: PollConfig, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollStep<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    loop {
        let delay = match probe().await {
            PollStep::Ready(value) => return Ok(value),
            PollStep::Pending => config.interval,
            PollStep::Transient(e) => {
                debug!(error = %e, "transient probe failure, retrying");
                config.retry_delay
            }
            PollStep::Abort(e) => return Err(PollError::Aborted(e)),
        };

        let waited = started.elapsed();
        let remaining = config.deadline.saturating_sub(waited);
        if remaining.is_zero() {
            return Err(PollError::DeadlineExceeded { waited });
        }
        tokio::time::sleep(delay.min(remaining)).await;
        if started.elapsed() >= config.deadline {
            return Err(PollError::DeadlineExceeded {
                waited: started.elapsed(),
            });
        }
    }
}
