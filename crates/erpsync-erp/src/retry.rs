//! Fixed-delay retry for rate-limited and dropped ERP requests.
//!
//! The ERP's 429 responses carry no `Retry-After`, so every retry waits the
//! same configured delay. Rate-limit and network retries are budgeted
//! separately; anything else is returned to the caller untouched.

use std::future::Future;
use std::time::Duration;

use erpsync_core::AppConfig;

use crate::error::ErpError;

/// Delays and caps for [`retry_fixed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
    pub network_retry_delay: Duration,
    pub max_network_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rate_limit_backoff: config.rate_limit_backoff(),
            max_rate_limit_retries: config.max_rate_limit_retries,
            network_retry_delay: config.network_retry_delay(),
            max_network_retries: config.max_network_retries,
        }
    }

    /// Same caps, no sleeping. Used by tests against mock servers.
    #[must_use]
    pub fn without_delays(self) -> Self {
        Self {
            rate_limit_backoff: Duration::ZERO,
            network_retry_delay: Duration::ZERO,
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_backoff: Duration::from_secs(2),
            max_rate_limit_retries: 10,
            network_retry_delay: Duration::from_secs(5),
            max_network_retries: 3,
        }
    }
}

/// Outcome of one attempt that did not produce a value.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// HTTP 429.
    RateLimited,
    /// The request never got a response.
    Network(reqwest::Error),
    /// Not retriable here.
    Fatal(ErpError),
}

/// Runs `operation` until it succeeds, fails fatally, or exhausts one of the
/// retry budgets in `policy`.
///
/// # Errors
///
/// - [`ErpError::RateLimitExceeded`] after `max_rate_limit_retries` retries.
/// - [`ErpError::Transient`] after `max_network_retries` retries.
/// - Any error the operation reports as [`AttemptError::Fatal`].
pub(crate) async fn retry_fixed<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> Result<T, ErpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut rate_limited = 0u32;
    let mut network_failures = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::RateLimited) => {
                if rate_limited >= policy.max_rate_limit_retries {
                    return Err(ErpError::RateLimitExceeded {
                        url: url.to_string(),
                        attempts: rate_limited + 1,
                    });
                }
                rate_limited += 1;
                tracing::warn!(
                    url,
                    attempt = rate_limited,
                    max_retries = policy.max_rate_limit_retries,
                    delay_ms = duration_ms(policy.rate_limit_backoff),
                    "rate limited by ERP; retrying after backoff"
                );
                tokio::time::sleep(policy.rate_limit_backoff).await;
            }
            Err(AttemptError::Network(source)) => {
                if network_failures >= policy.max_network_retries {
                    return Err(ErpError::Transient {
                        url: url.to_string(),
                        attempts: network_failures + 1,
                        source,
                    });
                }
                network_failures += 1;
                tracing::warn!(
                    url,
                    attempt = network_failures,
                    max_retries = policy.max_network_retries,
                    error = %source,
                    "network error talking to ERP; retrying"
                );
                tokio::time::sleep(policy.network_retry_delay).await;
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
