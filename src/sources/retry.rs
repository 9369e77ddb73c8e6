use std::{future::Future, str::FromStr, time::Duration};

use tracing::{debug, warn};

use super::SourceError;
use crate::models::Source;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

impl FromStr for Backoff {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Backoff::Fixed),
            "exponential" => Ok(Backoff::Exponential),
            other => anyhow::bail!("unknown backoff {other:?}, expected fixed or exponential"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, backoff }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(factor)
            },
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or runs
    /// out of attempts. Every failure comes back as `SourceError::Unavailable`.
    pub async fn run<T, F, Fut>(&self, connector: Source, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(%connector, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        %connector,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(SourceError::Unavailable { connector, attempts, reason }) => {
                    return Err(SourceError::Unavailable { connector, attempts, reason });
                },
                Err(err) => {
                    return Err(SourceError::Unavailable {
                        connector,
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Backoff::Exponential)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use reqwest::StatusCode;

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Backoff::Exponential)
    }

    #[test]
    fn backoff_names_parse() {
        assert_eq!("fixed".parse::<Backoff>().unwrap(), Backoff::Fixed);
        assert_eq!(" Exponential ".parse::<Backoff>().unwrap(), Backoff::Exponential);
        assert!("linear".parse::<Backoff>().is_err());
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run(Source::Tmdb, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SourceError::Status(StatusCode::SERVICE_UNAVAILABLE))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(3)
            .run(Source::Omdb, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Status(StatusCode::TOO_MANY_REQUESTS))
            })
            .await;
        match result {
            Err(SourceError::Unavailable { connector, attempts, .. }) => {
                assert_eq!(connector, Source::Omdb);
                assert_eq!(attempts, 3);
            },
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(5)
            .run(Source::Tmdb, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Status(StatusCode::UNAUTHORIZED))
            })
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delay_doubles() {
        let p = RetryPolicy::new(4, Duration::from_millis(100), Backoff::Exponential);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));

        let fixed = RetryPolicy::new(4, Duration::from_millis(100), Backoff::Fixed);
        assert_eq!(fixed.delay_for(3), Duration::from_millis(100));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Backoff::Fixed).max_attempts, 1);
    }
}
