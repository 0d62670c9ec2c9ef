//! Bounded polling of asynchronous cloud operations.
//!
//! [`ReadinessPoller`] repeatedly fetches a resource until it reports one of
//! two terminal states. Every wait has a mandatory upper bound and can be
//! interrupted through a [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::Server;
use crate::pause::pause;

/// Default delay between two status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A resource exposing a lifecycle status string.
pub trait Status {
    /// Returns the current status.
    fn status(&self) -> &str;
}

impl Status for Server {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Pair of states that end a poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminalStates {
    /// State that completes the poll successfully.
    pub success: &'static str,
    /// State that aborts the poll with [`PollError::Failed`].
    pub failure: &'static str,
}

/// Terminal states of a booting compute instance.
pub const SERVER_BOOT: TerminalStates = TerminalStates {
    success: "ACTIVE",
    failure: "ERROR",
};

/// Successful outcome of a poll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ready<R> {
    /// Last fetched resource, carrying the success state.
    pub resource: R,
    /// Number of fetches performed after the initial observation.
    pub polls: u32,
}

/// Errors raised while polling.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The resource reached the failure state.
    #[error("{resource} entered failure state {state}")]
    Failed {
        /// Label of the polled resource.
        resource: String,
        /// State that was observed.
        state: String,
    },
    /// The bound elapsed while the resource was still transitioning.
    #[error("{resource} still {last_state} after {waited:?}")]
    Timeout {
        /// Label of the polled resource.
        resource: String,
        /// Time spent waiting.
        waited: Duration,
        /// Last observed state.
        last_state: String,
    },
    /// Fetching the current state failed.
    #[error("status fetch failed: {0}")]
    Fetch(#[source] E),
    /// The run was cancelled while waiting.
    #[error("wait for {resource} cancelled")]
    Cancelled {
        /// Label of the polled resource.
        resource: String,
    },
}

/// Polls a resource at a fixed interval until it settles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPoller {
    interval: Duration,
    max_wait: Duration,
}

impl ReadinessPoller {
    /// Creates a poller bounded by `max_wait` using the default interval.
    #[must_use]
    pub const fn new(max_wait: Duration) -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait,
        }
    }

    /// Overrides the delay between fetches.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the delay between fetches.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the upper bound on the wait.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Polls until `initial` (then each fetched resource) reaches a terminal
    /// state.
    ///
    /// A fetch is never started when the next interval would overrun the
    /// bound; the poll then times out with the last observed state.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Failed`] on the failure state,
    /// [`PollError::Timeout`] when the bound elapses, [`PollError::Fetch`]
    /// when `fetch` fails, and [`PollError::Cancelled`] when `cancel` fires.
    pub async fn wait_until_terminal<R, E, F, Fut>(
        &self,
        label: &str,
        states: TerminalStates,
        initial: R,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> Result<Ready<R>, PollError<E>>
    where
        R: Status,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let started = Instant::now();
        let mut current = initial;
        let mut polls = 0_u32;

        loop {
            let state = current.status();
            if state == states.success {
                info!(resource = label, state, polls, "resource ready");
                return Ok(Ready {
                    resource: current,
                    polls,
                });
            }
            if state == states.failure {
                return Err(PollError::Failed {
                    resource: label.to_owned(),
                    state: state.to_owned(),
                });
            }

            let waited = started.elapsed();
            if waited + self.interval > self.max_wait {
                return Err(PollError::Timeout {
                    resource: label.to_owned(),
                    waited,
                    last_state: state.to_owned(),
                });
            }
            debug!(resource = label, state, polls, "waiting for terminal state");

            pause(self.interval, cancel)
                .await
                .map_err(|_| PollError::Cancelled {
                    resource: label.to_owned(),
                })?;
            current = fetch().await.map_err(PollError::Fetch)?;
            polls += 1;
        }
    }
}
