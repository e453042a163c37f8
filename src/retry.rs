//! Bounded polling for long-running collaborator jobs.
//!
//! A job is probed repeatedly until it reports a terminal status. Between
//! probes the caller's [`RetryPolicy`] decides how long to wait, and the
//! attempt ceiling turns an endless wait into an explicit
//! [`PollOutcome::Exhausted`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_MAX_ATTEMPTS: u32 = 120;
const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Configuration for bounded polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of probes (including the first one).
    pub max_attempts: u32,
    /// Delay before the second probe, in milliseconds.
    pub interval_ms: u64,
    /// Multiplier applied to the delay after every probe (1.0 = fixed interval).
    pub backoff: f64,
    /// Upper bound on a single delay, in milliseconds.
    pub max_interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_ms: DEFAULT_INTERVAL_MS,
            backoff: 1.0,
            max_interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        let interval_ms = interval.as_millis() as u64;
        Self {
            max_attempts,
            interval_ms,
            backoff: 1.0,
            max_interval_ms: interval_ms,
        }
    }

    /// Exponential backoff starting at `initial`, capped at `max`.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: initial.as_millis() as u64,
            backoff: 2.0,
            max_interval_ms: max.as_millis() as u64,
        }
    }

    /// Delay to wait after probe number `attempt` (1-indexed) came back pending.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = if self.backoff > 1.0 {
            self.backoff.powi(attempt.saturating_sub(1).min(16) as i32)
        } else {
            1.0
        };
        let ms = (self.interval_ms as f64 * factor).min(self.max_interval_ms.max(self.interval_ms) as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Status reported by a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The job finished with a value.
    Ready(T),
    /// The job is still running; probe again.
    Pending,
}

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A probe returned [`PollStatus::Ready`].
    Ready {
        /// The value produced by the job.
        value: T,
        /// Number of probes made.
        attempts: u32,
    },
    /// Every allowed probe returned [`PollStatus::Pending`].
    Exhausted {
        /// Number of probes made.
        attempts: u32,
    },
}

/// Probe a job until it is ready or the policy runs out of attempts.
///
/// `probe` receives the 1-indexed attempt number. An `Err` from the probe is
/// returned immediately: only an explicit [`PollStatus::Pending`] is retried.
pub async fn poll_until<T, E, F, Fut>(policy: &RetryPolicy, mut probe: F) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match probe(attempt).await? {
            PollStatus::Ready(value) => return Ok(PollOutcome::Ready { value, attempts: attempt }),
            PollStatus::Pending => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_after(attempt);
                    debug!("Job pending after attempt {attempt}, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_keeps_interval() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(4), Duration::from_millis(250));
    }

    #[test]
    fn exponential_policy_is_capped() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[test]
    fn default_matches_one_second_for_two_minutes() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 120);
        assert_eq!(policy.delay_after(7), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn poll_returns_first_ready_value() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let outcome: PollOutcome<&str> = poll_until(&policy, |attempt| async move {
            Ok::<_, String>(if attempt == 3 {
                PollStatus::Ready("done")
            } else {
                PollStatus::Pending
            })
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: "done",
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn poll_gives_up_after_max_attempts() {
        let policy = RetryPolicy::fixed(4, Duration::ZERO);
        let mut seen = 0;
        let outcome: PollOutcome<()> = poll_until(&policy, |_| {
            seen += 1;
            async { Ok::<_, String>(PollStatus::Pending) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert_eq!(seen, 4);
    }

    #[tokio::test]
    async fn poll_stops_on_probe_error() {
        let policy = RetryPolicy::fixed(10, Duration::ZERO);
        let mut seen = 0;
        let result: Result<PollOutcome<()>, String> = poll_until(&policy, |_| {
            seen += 1;
            async { Err("unexpected status: failed".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "unexpected status: failed");
        assert_eq!(seen, 1);
    }
}
