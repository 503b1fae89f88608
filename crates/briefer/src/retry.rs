//! Bounded exponential backoff and minimum-interval call pacing.
//!
//! [`RetryPolicy`] wraps a fallible async call and repeats it when the error is transient
//! (connection problems, timeouts, `429`, `5xx`). Delays double after every failed attempt:
//! with the defaults the call is made three times, sleeping 1 s and then 2 s in between.
//!
//! [`RateLimiter`] keeps the time of the last call and sleeps just long enough to keep calls at
//! least `min_interval` apart.
//!
//! ```no_run
//! use briefer::{prelude::*, retry::RetryPolicy};
//!
//! # async fn fetch() -> Result<String, BrieferError> { Ok(String::new()) }
//! # async fn example() -> Result<(), BrieferError> {
//! let body = RetryPolicy::default().run("fetch report", || fetch()).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tokio::time::Instant;

use super::*;

/// How often and how patiently to retry a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub attempts:      u32,
  /// Delay after the first failure
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { attempts: 3, initial_delay: Duration::from_secs(1) } }
}

impl RetryPolicy {
  /// Policy built from the retry settings in `config`.
  pub fn from_config(config: &Config) -> Self {
    Self { attempts: config.retry_attempts.max(1), initial_delay: config.retry_initial_delay() }
  }

  /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    self.initial_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
  }

  /// Runs `operation` until it succeeds, fails with a non-transient error, or attempts run out.
  ///
  /// The last error is returned unchanged.
  pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>, {
    let mut attempt = 1;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_transient() && attempt < self.attempts => {
          let delay = self.delay_after(attempt);
          warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            label, attempt, self.attempts, e, delay
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        },
        Err(e) => {
          if e.is_transient() {
            error!("{} failed after {} attempts: {}", label, attempt, e);
          }
          return Err(e);
        },
      }
    }
  }
}

/// Keeps consecutive calls at least `min_interval` apart.
#[derive(Debug)]
pub struct RateLimiter {
  /// Required gap between calls
  min_interval: Duration,
  /// When the previous call was let through
  last_call:    Option<Instant>,
}

impl RateLimiter {
  /// A limiter that has not yet seen a call.
  pub fn new(min_interval: Duration) -> Self { Self { min_interval, last_call: None } }

  /// Sleeps until the next call is allowed, then records it.
  pub async fn wait(&mut self) {
    if let Some(last) = self.last_call {
      let elapsed = last.elapsed();
      if elapsed < self.min_interval {
        let pause = self.min_interval - elapsed;
        trace!("Rate limiting for {:?}", pause);
        tokio::time::sleep(pause).await;
      }
    }
    self.last_call = Some(Instant::now());
  }
}
