//! Bounded retry with a non-counting soft signal.
//!
//! [`retry_until_success`] calls an operation until it succeeds or has failed
//! `max_attempts` times. The operation reports each failure as an
//! [`Attempt`]:
//!
//! - [`Attempt::Retry`] asks for another attempt without spending any of the
//!   budget and is not logged as a failure,
//! - [`Attempt::Fail`] spends one attempt and is logged.
//!
//! The helper sleeps `interval` between attempts, through a [`SleepProvider`]
//! so tests and non-Tokio callers can swap the timer.
//!
//! Running out of attempts is returned as [`RetryExhausted`]. Whether that
//! ends the process is up to the caller's entry point.
//!
//! ```rust,no_run
//! use ctlprog_core::retry::{Attempt, RetryPolicy, TokioSleep, retry_until_success};
//!
//! # async fn connect() -> Result<(), std::io::Error> { Ok(()) }
//! # async fn run() {
//! let session = retry_until_success::<TokioSleep, _, _, _, _>(&RetryPolicy::default(), || async {
//!     connect().await.map_err(Attempt::Fail)
//! })
//! .await;
//! # }
//! ```

use core::fmt;
use core::future::Future;
use core::time::Duration;

/// Number of counted failures tolerated by [`RetryPolicy::default`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Pause between attempts used by [`RetryPolicy::default`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Abstracts over how to sleep for a given [`Duration`] in async contexts.
pub trait SleepProvider {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}

/// [`SleepProvider`] backed by Tokio's timer.
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    async fn sleep_for(dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Try again without counting this attempt.
    Retry,
    /// A real failure; counts against the budget.
    Fail(E),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Counted failures allowed before giving up. Zero behaves like one.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INTERVAL)
    }
}

/// Every counted attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Number of counted failures.
    pub attempts: u32,
    /// The error of the final attempt.
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "too many retries ({} failed attempts), last error: {}",
            self.attempts, self.last
        )
    }
}

impl<E> std::error::Error for RetryExhausted<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}

/// Retries `op` until it succeeds or `policy.max_attempts` counted failures
/// have occurred.
///
/// # Errors
///
/// Returns [`RetryExhausted`] carrying the last error once the budget is
/// spent.
pub async fn retry_until_success<S, T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    S: SleepProvider,
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failures = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Attempt::Retry) => {
                tracing::trace!("retry requested");
            }
            Err(Attempt::Fail(e)) => {
                failures += 1;
                if failures >= max_attempts {
                    tracing::error!(attempts = failures, "too many retries: {e}");
                    return Err(RetryExhausted {
                        attempts: failures,
                        last: e,
                    });
                }
                tracing::warn!(attempt = failures, max_attempts, "retrying: {e}");
            }
        }
        S::sleep_for(policy.interval).await;
    }
}
