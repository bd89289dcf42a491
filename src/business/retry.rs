use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::ApiFailure;
use crate::config::SyncSettings;

/// Source of pauses. Production sleeps on tokio; tests record and return.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_step: settings.backoff_step,
            max_backoff: settings.max_backoff,
        }
    }

    /// Delay after the given failed attempt (1-based): step × attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step
            .saturating_mul(attempt.max(1))
            .min(self.max_backoff)
    }
}

/// Run `op`, retrying only on [`ApiFailure::RateLimited`], at most
/// `policy.max_attempts` times in total. The last rate-limit failure is
/// returned unchanged once attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    what: &str,
    mut op: F,
) -> Result<T, ApiFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiFailure>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Err(ApiFailure::RateLimited { retry_after }) => {
                if attempt >= attempts {
                    warn!("{what}: rate limited, giving up after {attempt} attempts");
                    return Err(ApiFailure::RateLimited { retry_after });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "{what}: rate limited, retrying in {:?} (attempt {}/{})",
                    delay, attempt, attempts
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
