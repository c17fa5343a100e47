//! Bounded-retry predicate polling.
//!
//! The daemon under test gives no latency bound on intent propagation, so
//! every check against derived state is phrased as a predicate handed to
//! [`wait_for_result`]: evaluate now, sleep, evaluate again, give up when
//! the window closes. This is the only retry point in the engine: the
//! waiters, the snapshot differ and the membership matcher never sleep or
//! re-poll on their own.
//!
//! A predicate returns `(success, payload)`. Infrastructure errors are not
//! part of that pair: they abort the wait immediately instead of being
//! misread as "not yet converged".

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::VerifyError;

/// How often to retry, how long to keep retrying, and what a timeout means.
///
/// One process-wide default usually serves a whole test scope; slow
/// domains (physical link state, fabric reachability) override it per call
/// site with [`PollingConfig::slow_converging`] or their own values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between predicate evaluations. Must be non-zero.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,

    /// Window in which the predicate may converge. A zero timeout still
    /// evaluates the predicate exactly once.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Whether running out the window is a hard failure or an ordinary
    /// negative result returned to the caller.
    #[serde(default = "strict_by_default")]
    pub strict: bool,
}

fn strict_by_default() -> bool {
    true
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            strict: true,
        }
    }
}

impl PollingConfig {
    /// Build a config from explicit values.
    #[must_use]
    pub fn new(polling_interval: Duration, timeout: Duration, strict: bool) -> Self {
        Self {
            polling_interval,
            timeout,
            strict,
        }
    }

    /// A non-strict config: a timeout is reported to the caller instead of
    /// failing the test. Used to assert an absence of change within a
    /// window, where the caller encodes the negative meaning in the
    /// predicate.
    #[must_use]
    pub fn relaxed(timeout: Duration) -> Self {
        Self {
            timeout,
            strict: false,
            ..Self::default()
        }
    }

    /// Preset for slow-converging domains, where software-state intervals
    /// would hammer the store for minutes.
    #[must_use]
    pub fn slow_converging() -> Self {
        Self {
            polling_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
            strict: true,
        }
    }

    fn validate(&self) -> Result<(), VerifyError> {
        if self.polling_interval.is_zero() {
            return Err(VerifyError::InvalidConfig {
                reason: "polling_interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Terminal state of one polling run.
#[derive(Debug, Clone)]
pub struct PollResult<T> {
    /// Whether the predicate reported success before the window closed.
    /// Always `true` on `Ok` results from a strict run.
    pub converged: bool,

    /// Payload from the final predicate evaluation, if it produced one.
    pub value: Option<T>,

    /// Number of predicate evaluations performed.
    pub attempts: u32,

    /// Time spent polling.
    pub elapsed: Duration,
}

impl<T> PollResult<T> {
    /// Payload of a converged run; `None` when the run timed out.
    pub fn into_value(self) -> Option<T> {
        if self.converged { self.value } else { None }
    }
}

/// Evaluate `predicate` until it reports success or `config.timeout`
/// elapses.
///
/// The predicate is always evaluated at least once, even with a zero
/// timeout, and a successful evaluation returns with no further delay.
/// After a failed evaluation the poller sleeps `polling_interval` and
/// retries while the elapsed time is under `timeout`.
///
/// On timeout a strict config yields [`VerifyError::ConvergenceTimeout`]
/// naming `expectation` and the last observed value; a non-strict config
/// yields an `Ok` result with `converged: false` so the caller can assert
/// the negative. Errors returned by the predicate itself propagate
/// immediately and are never retried.
pub async fn wait_for_result<T, F, Fut>(
    mut predicate: F,
    config: &PollingConfig,
    expectation: &str,
) -> Result<PollResult<T>, VerifyError>
where
    T: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(bool, Option<T>), VerifyError>>,
{
    config.validate()?;

    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last = None;

    loop {
        attempts += 1;
        let (converged, value) = predicate().await?;
        if converged {
            let elapsed = start.elapsed();
            debug!(
                expectation,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "converged"
            );
            return Ok(PollResult {
                converged: true,
                value,
                attempts,
                elapsed,
            });
        }
        last = value;
        if start.elapsed() >= config.timeout {
            break;
        }
        trace!(expectation, attempts, "not yet converged");
        tokio::time::sleep(config.polling_interval).await;
    }

    let elapsed = start.elapsed();
    if config.strict {
        Err(VerifyError::ConvergenceTimeout {
            expectation: expectation.to_string(),
            last_observed: match &last {
                Some(value) => format!("{value:?}"),
                None => "nothing".to_string(),
            },
            timeout: config.timeout,
        })
    } else {
        warn!(
            expectation,
            attempts, "polling window closed without convergence"
        );
        Ok(PollResult {
            converged: false,
            value: last,
            attempts,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_zero_interval_is_a_config_error() {
        let config = PollingConfig::new(Duration::ZERO, Duration::from_secs(1), true);
        let err = wait_for_result(
            || async move { Ok((true, Some(1u32))) },
            &config,
            "anything",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_zero_timeout_evaluates_exactly_once() {
        let calls = Cell::new(0u32);
        let calls_ref = &calls;
        let config = PollingConfig::new(Duration::from_millis(10), Duration::ZERO, false);

        let result = wait_for_result(
            || async move {
                calls_ref.set(calls_ref.get() + 1);
                Ok((false, None::<u32>))
            },
            &config,
            "a change that never comes",
        )
        .await
        .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(result.attempts, 1);
        assert!(!result.converged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_returns_without_delay() {
        let result = wait_for_result(
            || async move { Ok((true, Some("ready"))) },
            &PollingConfig::default(),
            "readiness",
        )
        .await
        .unwrap();

        assert!(result.converged);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.value, Some("ready"));
        assert!(result.elapsed.is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_predicate_holds() {
        let calls = Cell::new(0u32);
        let calls_ref = &calls;
        let config = PollingConfig::new(Duration::from_millis(10), Duration::from_secs(5), true);

        let result = wait_for_result(
            || async move {
                calls_ref.set(calls_ref.get() + 1);
                Ok((calls_ref.get() >= 3, Some(calls_ref.get())))
            },
            &config,
            "third attempt",
        )
        .await
        .unwrap();

        assert!(result.converged);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.value, Some(3));
        assert_eq!(result.elapsed, Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_timeout_names_expectation_and_last_observed() {
        let config = PollingConfig::new(Duration::from_millis(10), Duration::from_secs(2), true);

        let err = wait_for_result(
            || async move { Ok((false, Some("inactive"))) },
            &config,
            "state to become \"active\"",
        )
        .await
        .unwrap_err();

        match &err {
            VerifyError::ConvergenceTimeout {
                expectation,
                last_observed,
                timeout,
            } => {
                assert_eq!(expectation, "state to become \"active\"");
                assert!(last_observed.contains("inactive"));
                assert_eq!(*timeout, Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("state to become \"active\""));
        assert!(message.contains("inactive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_strict_timeout_returns_last_observed() {
        let config = PollingConfig::relaxed(Duration::from_millis(50));

        let result = wait_for_result(
            || async move { Ok((false, Some(7u32))) },
            &config,
            "a count that never moves",
        )
        .await
        .unwrap();

        assert!(!result.converged);
        assert_eq!(result.value, Some(7));
        assert!(result.into_value().is_none());
    }

    #[tokio::test]
    async fn test_store_error_aborts_without_retry() {
        let calls = Cell::new(0u32);
        let calls_ref = &calls;

        let err = wait_for_result(
            || async move {
                calls_ref.set(calls_ref.get() + 1);
                Err::<(bool, Option<u32>), _>(VerifyError::Store(StoreError::Connection {
                    reason: "socket closed".to_string(),
                }))
            },
            &PollingConfig::default(),
            "anything",
        )
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, VerifyError::Store(_)));
    }

    #[test]
    fn test_config_deserializes_human_readable_durations() {
        let config: PollingConfig =
            serde_yaml::from_str("polling_interval: 50ms\ntimeout: 2s\nstrict: false\n").unwrap();
        assert_eq!(config.polling_interval, Duration::from_millis(50));
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(!config.strict);
    }

    #[test]
    fn test_config_strict_defaults_to_true_when_omitted() {
        let config: PollingConfig =
            serde_yaml::from_str("polling_interval: 1s\ntimeout: 2m\n").unwrap();
        assert!(config.strict);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = PollingConfig::slow_converging();
        let text = serde_json::to_string(&config).unwrap();
        let back: PollingConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
