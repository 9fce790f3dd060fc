//! Retry-After support for HTTP backoff.
//!
//! Servers answering 429 or 503 often say how long to wait via the `Retry-After` header. The
//! [`RetryAfter`] backoff honours that hint and falls back to another strategy otherwise.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::{header::RETRY_AFTER, HeaderMap, StatusCode};

use crate::backoff::{Backoff, Fixed};
use crate::context::{self, Context};
use crate::Error;

/// The longest server-requested wait [`RetryAfter::default`] honours.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Parses the `Retry-After` header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats. Returns `None` when the header is
/// absent, malformed, or names a date that has already passed.
///
/// # Examples
///
/// ```
/// use retryer::rate_limit::parse_retry_after;
/// use http::HeaderMap;
/// use std::time::Duration;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("retry-after", "120".parse().unwrap());
///
/// assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
/// ```
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if header.starts_with(|c: char| c.is_ascii_digit()) {
        return header.parse::<u64>().ok().map(Duration::from_secs);
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    date_time.duration_since(SystemTime::now()).ok()
}

/// Backoff that honours `Retry-After` on 429 and 503 responses.
///
/// When the failed attempt produced a [`StatusCodeError`](crate::StatusCodeError) with status 429
/// or 503 and a parsable `Retry-After` header, waits that long (capped by `max_wait`). Any other
/// failure is delegated to the fallback strategy.
///
/// # Examples
///
/// ```
/// use retryer::backoff::Exponential;
/// use retryer::rate_limit::RetryAfter;
/// use std::time::Duration;
///
/// let backoff = RetryAfter::new(Exponential::default()).max_wait(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct RetryAfter<B = Fixed> {
    fallback: B,
    max_wait: Duration,
}

impl<B> RetryAfter<B> {
    /// Creates a `Retry-After` aware backoff delegating to `fallback` when no hint applies.
    pub fn new(fallback: B) -> Self {
        Self {
            fallback,
            max_wait: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    /// Sets the longest server-requested wait that will be honoured.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Returns the server-requested wait for `err`, capped at `max_wait`, if one applies.
    pub fn requested_wait(&self, err: &Error) -> Option<Duration> {
        let err = err.as_status()?;
        if !matches!(
            err.status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return None;
        }
        parse_retry_after(&err.headers).map(|wait| wait.min(self.max_wait))
    }
}

impl Default for RetryAfter<Fixed> {
    fn default() -> Self {
        Self::new(Fixed::default())
    }
}

#[async_trait]
impl<B> Backoff<Error> for RetryAfter<B>
where
    B: Backoff<Error>,
{
    async fn backoff(&self, ctx: &Context, attempt: usize, err: &Error) {
        match self.requested_wait(err) {
            Some(wait) => {
                tracing::debug!(
                    wait_ms = wait.as_millis() as u64,
                    attempt,
                    "Honouring Retry-After before next attempt"
                );
                context::sleep(ctx, wait).await;
            }
            None => self.fallback.backoff(ctx, attempt, err).await,
        }
    }
}
