//! Fixed-interval condition polling with a hard deadline
//!
//! [`PollExecutor::run`] drives one sequential loop: fetch the resource, feed the
//! snapshot to a [`Condition`], then decide whether to continue, succeed, fail
//! or time out.
//!
//! - `NotFound` from the fetcher is treated as pending; the object may simply
//!   not have been created or propagated yet.
//! - Any other fetch error fails immediately.
//! - A terminal failure reported by the condition fails immediately.
//! - Cancellation is observed at tick boundaries and while sleeping, never
//!   mid-fetch.
//!
//! # Example
//!
//! ```ignore
//! let report = PollExecutor::new(PollSpec::resource_completion())
//!     .run(&cancel, &key, &KubeFetcher::new(client, ResourceKind::Pod), &Condition::PodCompletion)
//!     .await;
//! report.into_result()?;
//! ```

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::condition::{Condition, ConditionResult};
use crate::fetch::{FetchError, ObjectKey, ResourceFetcher, Snapshot};
use crate::Error;

/// Reason attached to an outcome caused by a non-recoverable fetch error
pub const REASON_FETCH_FAILED: &str = "FetchFailed";

/// Poll interval for short existence checks
pub const EXISTENCE_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Timeout for short existence checks
pub const EXISTENCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll interval for pods and builds running to completion
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Timeout for pods and builds running to completion
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Timing of a poll run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSpec {
    /// Time between attempts
    pub interval: Duration,
    /// Maximum time from start until the run gives up
    pub timeout: Duration,
    /// Fetch once before the first interval wait
    pub poll_immediately: bool,
}

impl PollSpec {
    /// Create a spec, rejecting a zero interval.
    ///
    /// A timeout shorter than the interval is allowed and yields at most one
    /// attempt. A timeout too large to add to the clock means no deadline.
    pub fn new(
        interval: Duration,
        timeout: Duration,
        poll_immediately: bool,
    ) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        Ok(Self {
            interval,
            timeout,
            poll_immediately,
        })
    }

    /// Spec for resources that only need to appear (secrets)
    pub fn existence() -> Self {
        Self {
            interval: EXISTENCE_POLL_INTERVAL,
            timeout: EXISTENCE_TIMEOUT,
            poll_immediately: true,
        }
    }

    /// Spec for resources that run to completion (pods, builds)
    pub fn resource_completion() -> Self {
        Self {
            interval: COMPLETION_POLL_INTERVAL,
            timeout: COMPLETION_TIMEOUT,
            poll_immediately: true,
        }
    }

    /// Same spec with a different interval
    pub fn with_interval(mut self, interval: Duration) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        self.interval = interval;
        Ok(self)
    }

    /// Same spec with a different timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Final result of a poll run
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The condition was satisfied
    Succeeded,
    /// Terminal resource failure or non-recoverable fetch error
    Failed {
        /// Machine-readable reason
        reason: String,
        /// Human-readable detail
        message: String,
    },
    /// The deadline passed before a terminal state was observed
    TimedOut {
        /// Last snapshot seen, `None` if every attempt was NotFound
        last_snapshot: Option<Snapshot>,
    },
    /// The cancellation token fired
    Cancelled,
}

impl PollOutcome {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Convert the outcome into an assertion result for `key`.
    ///
    /// `timeout` is only used to annotate a timed-out outcome.
    pub fn into_result(self, key: &ObjectKey, timeout: Duration) -> Result<(), Error> {
        match self {
            Self::Succeeded => Ok(()),
            Self::Failed { reason, message } => Err(Error::ConditionFailed {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                reason,
                message,
            }),
            Self::TimedOut { last_snapshot } => Err(Error::Timeout {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                timeout,
                last_snapshot: match last_snapshot {
                    Some(snapshot) => format!("last observed {}", snapshot),
                    None => "no snapshot observed".to_string(),
                },
            }),
            Self::Cancelled => Err(Error::Cancelled {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            }),
        }
    }
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed { reason, message } => write!(f, "failed ({}): {}", reason, message),
            Self::TimedOut {
                last_snapshot: Some(s),
            } => write!(f, "timed out, last observed {}", s),
            Self::TimedOut {
                last_snapshot: None,
            } => f.write_str("timed out, no snapshot observed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of a poll run together with what it took to get there
#[derive(Clone, Debug)]
pub struct PollReport {
    /// Object that was polled
    pub key: ObjectKey,
    /// Final outcome
    pub outcome: PollOutcome,
    /// Number of fetch attempts made
    pub attempts: u32,
    /// Wall time from start to outcome
    pub elapsed: Duration,
    /// Timeout the run was configured with
    pub timeout: Duration,
}

impl PollReport {
    /// Convert into an assertion result, keeping the report on success
    pub fn into_result(self) -> Result<Self, Error> {
        self.outcome.clone().into_result(&self.key, self.timeout)?;
        Ok(self)
    }
}

/// Runs poll loops with a fixed [`PollSpec`]
#[derive(Clone, Debug)]
pub struct PollExecutor {
    spec: PollSpec,
}

impl PollExecutor {
    /// Create an executor for the given spec
    pub fn new(spec: PollSpec) -> Self {
        Self { spec }
    }

    /// Poll `key` through `fetcher` until `condition` is decided, the deadline
    /// passes, or `cancel` fires.
    #[instrument(
        skip_all,
        fields(kind = %condition.kind(), namespace = %key.namespace, name = %key.name)
    )]
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        key: &ObjectKey,
        fetcher: &F,
        condition: &Condition,
    ) -> PollReport
    where
        F: ResourceFetcher + ?Sized,
    {
        let start = Instant::now();
        let deadline = start.checked_add(self.spec.timeout);
        let mut attempts = 0u32;
        let mut last_snapshot: Option<Snapshot> = None;

        let report = |outcome: PollOutcome, attempts: u32| PollReport {
            key: key.clone(),
            outcome,
            attempts,
            elapsed: start.elapsed(),
            timeout: self.spec.timeout,
        };

        if !self.spec.poll_immediately && !self.sleep_interval(cancel).await {
            warn!(attempt = attempts, "polling cancelled");
            return report(PollOutcome::Cancelled, attempts);
        }

        loop {
            attempts += 1;
            let fetched = fetcher.get(key).await;

            // Cancellation wins over whatever the fetch returned
            if cancel.is_cancelled() {
                warn!(attempt = attempts, "polling cancelled");
                return report(PollOutcome::Cancelled, attempts);
            }

            match fetched {
                Err(FetchError::NotFound { .. }) => {
                    debug!(attempt = attempts, "not found yet");
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "fetch failed, not retrying");
                    return report(
                        PollOutcome::Failed {
                            reason: REASON_FETCH_FAILED.to_string(),
                            message: e.to_string(),
                        },
                        attempts,
                    );
                }
                Ok(snapshot) => match condition.evaluate(&snapshot) {
                    ConditionResult::Satisfied => {
                        info!(
                            attempt = attempts,
                            elapsed_ms = start.elapsed().as_millis(),
                            "condition satisfied"
                        );
                        return report(PollOutcome::Succeeded, attempts);
                    }
                    ConditionResult::Failed { reason, message } => {
                        warn!(
                            attempt = attempts,
                            reason = %reason,
                            message = %message,
                            "resource reached terminal failure"
                        );
                        return report(PollOutcome::Failed { reason, message }, attempts);
                    }
                    ConditionResult::Pending => {
                        debug!(attempt = attempts, state = %snapshot, "condition pending");
                        last_snapshot = Some(snapshot);
                    }
                },
            }

            // No tick may start past the deadline: if the next one would, wait
            // out the remaining time and give up.
            if let Some(deadline) = deadline {
                let now = Instant::now();
                let next_tick_in_time = now
                    .checked_add(self.spec.interval)
                    .is_some_and(|next| next <= deadline);
                if !next_tick_in_time {
                    if now < deadline && !sleep_or_cancel(cancel, sleep_until(deadline)).await {
                        warn!(attempt = attempts, "polling cancelled");
                        return report(PollOutcome::Cancelled, attempts);
                    }
                    warn!(
                        attempt = attempts,
                        timeout = ?self.spec.timeout,
                        observed = last_snapshot.is_some(),
                        "timed out waiting for condition"
                    );
                    return report(PollOutcome::TimedOut { last_snapshot }, attempts);
                }
            }

            if !self.sleep_interval(cancel).await {
                warn!(attempt = attempts, "polling cancelled");
                return report(PollOutcome::Cancelled, attempts);
            }
        }
    }

    /// Sleep one interval. Returns `false` if cancelled first.
    async fn sleep_interval(&self, cancel: &CancellationToken) -> bool {
        sleep_or_cancel(cancel, sleep(self.spec.interval)).await
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, timer: Sleep) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = timer => true,
    }
}
