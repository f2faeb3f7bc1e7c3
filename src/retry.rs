//! Exponential backoff with jitter for retrying transient failures.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{AttemptRecord, CoreError, ErrorKind};

/// Retry policy for a single logical operation (a hook call, a batch
/// retrieval). Durations are stored as seconds internally so the config is
/// plain-data serializable; use the accessor methods to get [`Duration`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_factor: f64,
    pub jitter_secs: f64,
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            backoff_factor: 2.0,
            jitter_secs: 0.25,
            retryable_kinds: [ErrorKind::Connection, ErrorKind::Timeout, ErrorKind::Protocol]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs.max(0.0))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay_secs.max(0.0))
    }

    /// Delay to wait before attempt number `attempt` (1-indexed: `attempt`
    /// is the attempt that just failed), including jitter.
    pub fn delay_for_attempt(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let backoff = self.base_delay_secs * self.backoff_factor.powi(exponent);
        let capped = backoff.min(self.max_delay_secs).max(0.0);
        let jitter = if self.jitter_secs > 0.0 {
            rng.random_range(0.0..=self.jitter_secs)
        } else {
            0.0
        };
        Duration::from_secs_f64(capped + jitter)
    }

    pub fn accepts(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }
}

/// Run `op` up to `config.max_attempts` times, sleeping with exponential
/// backoff between attempts. `op` is invoked with the 1-indexed attempt
/// number so it can annotate its own error context. Retrying stops as soon
/// as an error's [`ErrorKind`] isn't in `config.retryable_kinds`, or as soon
/// as [`CoreError::is_retryable_by_default`] says no regardless of kind
/// (a non-transient `ProtocolError` stays in the default retryable-kinds
/// set but is never actually retried), or once `max_attempts` is reached;
/// in all cases the final error carries the full attempt history via
/// [`CoreError::with_attempt_history`].
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, CoreError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0u32;
    let mut rng = rand::rng();
    let mut history: Vec<AttemptRecord> = Vec::new();

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = config.accepts(err.kind()) && err.is_retryable_by_default();
                let exhausted = attempt >= config.max_attempts;
                if !retryable || exhausted {
                    history.push(AttemptRecord {
                        attempt,
                        delay: Duration::ZERO,
                        error: err.to_string(),
                    });
                    return Err(err.with_attempt(attempt).with_attempt_history(&history));
                }

                let delay = config.delay_for_attempt(attempt, &mut rng);
                history.push(AttemptRecord {
                    attempt,
                    delay,
                    error: err.to_string(),
                });
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorContext;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            backoff_factor: 1.0,
            jitter_secs: 0.0,
            retryable_kinds: [ErrorKind::Connection].into_iter().collect(),
        };

        let result = retry_with_backoff(&config, |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::connection("not yet", ErrorContext::default()))
                } else {
                    Ok::<_, CoreError>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_kind_stops_immediately() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            retryable_kinds: [ErrorKind::Connection].into_iter().collect(),
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            jitter_secs: 0.0,
            ..RetryConfig::default()
        };

        let result: Result<(), CoreError> = retry_with_backoff(&config, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::authentication("denied", ErrorContext::default())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_protocol_error_is_retried_but_permanent_one_is_not() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            jitter_secs: 0.0,
            ..RetryConfig::default()
        };

        let transient_calls = AtomicU32::new(0);
        let transient_result: Result<(), CoreError> = retry_with_backoff(&config, |_attempt| {
            let n = transient_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::protocol("malformed response", ErrorContext::default(), true))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(transient_result.is_ok());
        assert_eq!(transient_calls.load(Ordering::SeqCst), 2);

        let permanent_calls = AtomicU32::new(0);
        let permanent_result: Result<(), CoreError> = retry_with_backoff(&config, |_attempt| {
            permanent_calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::protocol("unsupported version", ErrorContext::default(), false)) }
        })
        .await;
        assert!(permanent_result.is_err());
        assert_eq!(permanent_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_attempts_embeds_history() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            jitter_secs: 0.0,
            retryable_kinds: [ErrorKind::Timeout].into_iter().collect(),
            ..RetryConfig::default()
        };

        let result: Result<(), CoreError> = retry_with_backoff(&config, |_attempt| async {
            Err(CoreError::timeout("slow", ErrorContext::default()))
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.context().metadata["attempts"].is_array());
        assert_eq!(err.context().metadata["attempts"].as_array().unwrap().len(), 2);
    }
}
