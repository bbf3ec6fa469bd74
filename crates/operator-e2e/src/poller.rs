//! Retry-until-predicate-holds primitive every wait is built on.
//!
//! A probe reads fresh state and classifies it as [`Probe::Ready`] or
//! [`Probe::Pending`]. The first probe runs immediately; afterwards the poller
//! sleeps one interval between probes until the deadline passes. Transient
//! platform errors count as a pending attempt and never escape. A probe that
//! hangs is cut off at the deadline, or one interval after it at the latest.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{E2eError, Result};

/// Interval between probes and the hard deadline of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Same interval, different deadline.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            interval: self.interval,
            timeout,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(600))
    }
}

/// Outcome of a single probe, carrying the state it observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<S> {
    Ready(S),
    Pending(S),
}

impl<S> Probe<S> {
    /// `Ready(state)` if `satisfied`, otherwise `Pending(state)`.
    pub fn when(satisfied: bool, state: S) -> Self {
        if satisfied {
            Self::Ready(state)
        } else {
            Self::Pending(state)
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Blocking condition waiter.
///
/// Waits run to completion or timeout; there is no cancellation and no
/// background work. Callers go through [`Poller::wait_for`] so the strategy
/// can change (for example to a watch) without touching them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    settings: PollSettings,
}

impl Poller {
    #[must_use]
    pub const fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Poller with the same interval and a different deadline.
    #[must_use]
    pub const fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(self.settings.with_timeout(timeout))
    }

    /// Probe until it reports ready, returning the ready state.
    ///
    /// `condition` describes what is awaited and only appears in logs and
    /// the timeout error.
    ///
    /// # Errors
    ///
    /// `E2eError::TimeoutExceeded` with the last observed state once the
    /// deadline passes. Non-transient errors from the probe are returned as-is.
    pub async fn wait_for<S, F, Fut>(&self, condition: &str, mut probe: F) -> Result<S>
    where
        S: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<S>>>,
    {
        let PollSettings { interval, timeout } = self.settings;
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_observed: Option<String> = None;
        let mut last_error: Option<String> = None;

        loop {
            attempts += 1;

            let budget = timeout.saturating_sub(start.elapsed()).max(interval);
            let Ok(outcome) = tokio::time::timeout(budget, probe()).await else {
                warn!(
                    condition = %condition,
                    attempt = attempts,
                    budget_secs = budget.as_secs(),
                    "Read did not complete in time"
                );
                // the budget never ends before the deadline
                last_error = Some(format!("read timed out after {budget:?}"));
                return Err(timed_out(condition, start, last_observed, last_error));
            };

            match outcome {
                Ok(Probe::Ready(state)) => {
                    debug!(
                        condition = %condition,
                        attempts,
                        elapsed_secs = start.elapsed().as_secs(),
                        "Condition satisfied"
                    );
                    return Ok(state);
                }
                Ok(Probe::Pending(state)) => {
                    debug!(
                        condition = %condition,
                        attempt = attempts,
                        observed = ?state,
                        "Condition not yet satisfied"
                    );
                    last_observed = Some(format!("{state:?}"));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        condition = %condition,
                        attempt = attempts,
                        error = %e,
                        "Transient query failure, retrying"
                    );
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(timed_out(condition, start, last_observed, last_error));
            }

            // never sleep past the deadline: the final probe runs at the deadline
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        }
    }

    /// Probe a plain predicate until it returns true.
    ///
    /// # Errors
    ///
    /// See [`Poller::wait_for`].
    pub async fn wait_until<F, Fut>(&self, condition: &str, mut predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.wait_for(condition, || {
            let check = predicate();
            async move { check.await.map(|ok| Probe::when(ok, ok)) }
        })
        .await
        .map(|_| ())
    }
}

fn timed_out(
    condition: &str,
    start: Instant,
    last_observed: Option<String>,
    last_error: Option<String>,
) -> E2eError {
    let last_observed = match (last_observed, last_error) {
        (Some(state), _) => state,
        (None, Some(error)) => format!("no successful read (last error: {error})"),
        (None, None) => "nothing".to_string(),
    };
    E2eError::TimeoutExceeded {
        condition: condition.to_string(),
        elapsed: start.elapsed(),
        last_observed,
        diagnostics: None,
    }
}
