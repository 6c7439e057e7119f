//! Retry policy and fallback order

use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;

use crate::error::Error;
use crate::Provider;

/// Retry policy for rate-limited requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy
{   /// Retries after the first attempt
    pub max_retries: u32
  , pub base_delay: Duration
  , /// Upper bound of the additive uniform jitter
    pub max_jitter: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: u32
    , base_delay_ms: u64
    , max_jitter_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , base_delay: Duration::from_millis(base_delay_ms)
          , max_jitter: Duration::from_millis(max_jitter_ms)
        }
    }

    /// Same policy without jitter
    pub fn without_jitter(mut self) -> Self
    {   self.max_jitter = Duration::ZERO;
        self
    }

    /// base * 2^attempt, before jitter
    pub fn backoff_for_attempt(
      &self
    , attempt: u32
    ) -> Duration
    {   let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Backoff plus a uniform draw from [0, max_jitter]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration
    {   let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0
        {   Duration::ZERO
        } else
        {   Duration::from_millis(
              rand::thread_rng().gen_range(0..=jitter_ms)
            )
        };
        self.backoff_for_attempt(attempt).saturating_add(jitter)
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::from(&crate::config::RetryConfig::default())
    }
}

impl From<&crate::config::RetryConfig> for RetryPolicy
{   fn from(config: &crate::config::RetryConfig) -> Self
    {   RetryPolicy::new(
          config.max_retries
        , config.base_delay_ms
        , config.max_jitter_ms
        )
    }
}

/// Waits between retries. Swappable so tests need not wait.
#[async_trait]
pub trait Sleeper: Send + Sync
{   async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper
{   async fn sleep(&self, delay: Duration)
    {   tokio::time::sleep(delay).await;
    }
}

/// Run `operation`, retrying only rate-limit-class failures.
///
/// At most `max_retries + 1` attempts. Any other failure, or the
/// last rate-limit failure, is returned as is.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy
, sleeper: &dyn Sleeper
, mut operation: F
) -> Result<T, Error>
where
  F: FnMut() -> Fut
, Fut: Future<Output = Result<T, Error>>
{   let mut attempt: u32 = 0;
    loop
    {   match operation().await
        {   Ok(value) => return Ok(value)
          , Err(e) if !e.is_rate_limited() => {
              debug!("Not retrying non-rate-limit error: {}", e);
              return Err(e);
            }
          , Err(e) if attempt >= policy.max_retries => {
              warn!(
                "Still rate limited after {} attempts: {}",
                attempt + 1, e
              );
              return Err(e);
            }
          , Err(e) => {
              let delay = policy.delay_for_attempt(attempt);
              info!(
                "Rate limited, retrying in {}ms (attempt {}/{}): {}",
                delay.as_millis(),
                attempt + 1,
                policy.max_retries,
                e
              );
              sleeper.sleep(delay).await;
              attempt += 1;
            }
        }
    }
}

/// Fixed priority order for the fallback sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOrder
{   providers: Vec<Provider>
}

impl FallbackOrder
{   pub fn new(providers: Vec<Provider>) -> Self
    {   debug!(
          "Creating fallback order with {} providers",
          providers.len()
        );
        FallbackOrder { providers }
    }

    pub fn first(&self) -> Option<Provider>
    {   self.providers.first().copied()
    }

    pub fn as_slice(&self) -> &[Provider]
    {   &self.providers
    }

    pub fn is_empty(&self) -> bool
    {   self.providers.is_empty()
    }

    /// Order with the already-failed preferred provider removed
    pub fn candidates_excluding(
      &self
    , preferred: Provider
    ) -> Vec<Provider>
    {   self.providers
          .iter()
          .copied()
          .filter(|p| *p != preferred)
          .collect()
    }
}

impl Default for FallbackOrder
{   fn default() -> Self
    {   FallbackOrder::new(crate::config::default_fallback_order())
    }
}
