//! Backoff strategies executed between a failed attempt and the next one.
//!
//! A [`Backoff`] receives the caller's [`Context`], the zero-based attempt number and the error
//! that caused the retry. Every strategy that waits does so with [`context::sleep`], so a
//! cancelled context cuts the wait short.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::context::{self, Context};

/// The wait used by [`Fixed::default`].
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// A delay strategy run between attempts.
///
/// Besides the provided strategies, any `Fn(usize, &E) -> Duration` closure is a `Backoff`: it
/// computes the wait for the given attempt and error. A closure returning [`Duration::ZERO`] never
/// waits, which makes it usable as a pure observer of retries (logging, metrics, counting).
///
/// # Examples
///
/// ```
/// use retryer::{backoff::Backoff, Context};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let linear = |attempt: usize, _err: &std::io::Error| Duration::from_millis(10) * attempt as u32;
/// let err = std::io::Error::from(std::io::ErrorKind::TimedOut);
/// linear.backoff(&Context::background(), 0, &err).await;
/// # }
/// ```
#[async_trait]
pub trait Backoff<E>: Send + Sync {
    /// Waits before attempt `attempt + 1`. Must return promptly once `ctx` is done.
    async fn backoff(&self, ctx: &Context, attempt: usize, err: &E);
}

#[async_trait]
impl<E, F> Backoff<E> for F
where
    E: Sync,
    F: Fn(usize, &E) -> Duration + Send + Sync,
{
    async fn backoff(&self, ctx: &Context, attempt: usize, err: &E) {
        let wait = self(attempt, err);
        context::sleep(ctx, wait).await;
    }
}

/// Retries immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

#[async_trait]
impl<E: Sync> Backoff<E> for NoBackoff {
    async fn backoff(&self, _ctx: &Context, _attempt: usize, _err: &E) {}
}

/// Waits the same duration before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed(pub Duration);

impl Default for Fixed {
    fn default() -> Self {
        Self(DEFAULT_BACKOFF)
    }
}

#[async_trait]
impl<E: Sync> Backoff<E> for Fixed {
    async fn backoff(&self, ctx: &Context, _attempt: usize, _err: &E) {
        context::sleep(ctx, self.0).await;
    }
}

/// Waits exponentially longer before each retry.
///
/// The wait before retry `attempt` (zero-based) is `initial_delay * 2^attempt`, capped at
/// `max_delay`. With jitter enabled the wait is scaled by a random factor between 50% and 100%.
///
/// # Examples
///
/// ```
/// use retryer::backoff::Exponential;
/// use std::time::Duration;
///
/// let backoff = Exponential {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(1),
///     jitter: false,
/// };
/// assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
/// assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(800));
/// assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    /// The wait before the first retry.
    pub initial_delay: Duration,
    /// The longest wait between retries.
    pub max_delay: Duration,
    /// Whether to randomise waits to avoid synchronised retries across callers.
    pub jitter: bool,
}

impl Exponential {
    /// Returns the wait before retry `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let multiplier = 2u32.saturating_pow(exponent);
        let delay = self
            .initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

impl Default for Exponential {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

#[async_trait]
impl<E: Sync> Backoff<E> for Exponential {
    async fn backoff(&self, ctx: &Context, attempt: usize, _err: &E) {
        context::sleep(ctx, self.delay_for_attempt(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff = Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(1600));
        assert_eq!(backoff.delay_for_attempt(64), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_jitter_bounds() {
        let backoff = Exponential {
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            jitter: true,
        };

        for _ in 0..100 {
            let delay = backoff.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_waits() {
        let start = Instant::now();
        Fixed::default()
            .backoff(&Context::background(), 0, &"err")
            .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_BACKOFF && elapsed < Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_cut_short_by_cancel() {
        let ctx = Context::background();
        ctx.cancel();

        let start = Instant::now();
        Fixed(Duration::from_secs(60)).backoff(&ctx, 0, &"err").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_backoff() {
        let linear = |attempt: usize, _err: &&str| Duration::from_secs(attempt as u64);

        let start = Instant::now();
        linear.backoff(&Context::background(), 2, &"err").await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2050));
    }
}
