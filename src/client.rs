//! HTTP adapter over the generic retry engine.
//!
//! [`HttpRetryer`] rebuilds the request for every attempt, executes it through a [`Transport`],
//! turns unexpected status codes into [`StatusCodeError`]s and feeds everything back through a
//! [`Retryer`]. Use [`HttpRetryer::send`] to get the raw response or [`HttpRetryer::call`] to
//! decode the body.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::backoff::Backoff;
use crate::classify::{is_non_retryable_status_code, is_retryable_status_code};
use crate::context::Context;
use crate::rate_limit::RetryAfter;
use crate::response::{self, ContentTypeDecoder, Decode, DEFAULT_MAX_BYTES};
use crate::retry::{MaxAttemptsMode, Predicate, Retryer, DEFAULT_MAX_ATTEMPTS};
use crate::{BoxError, DecodeError, Error, Result, StatusCodeError};

/// Predicate deciding whether an unexpected status code is worth retrying.
pub type StatusPredicate = Arc<dyn Fn(&Context, StatusCode) -> bool + Send + Sync>;

/// Executes one HTTP request.
///
/// Implemented for [`reqwest::Client`]. Custom implementations can add instrumentation, route
/// through a proxy, or stand in for the network in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response head; the body is read by the caller.
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl<Tr> Transport for Arc<Tr>
where
    Tr: Transport + ?Sized,
{
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError> {
        (**self).execute(request).await
    }
}

/// Retries HTTP round trips.
///
/// The value is immutable once configured and cheap to clone; a shared base is cloned and
/// specialised without affecting other holders. Concurrent calls through one value are
/// independent.
///
/// Defaults:
/// - transport: a fresh [`reqwest::Client`],
/// - mode [`MaxAttemptsMode::NonRetryableReset`] with [`DEFAULT_MAX_ATTEMPTS`] attempts,
/// - retryable: [`Error::is_retryable`],
/// - retryable status codes: [`is_retryable_status_code`],
/// - early return: status errors whose code [`is_non_retryable_status_code`],
/// - decoder: [`ContentTypeDecoder`],
/// - backoff: [`RetryAfter::default`], honouring `Retry-After` on 429/503 for at most
///   [`DEFAULT_MAX_RETRY_AFTER`](crate::rate_limit::DEFAULT_MAX_RETRY_AFTER) (5 minutes), and
///   waiting 200ms otherwise, including when the header names a date already past,
/// - at most [`DEFAULT_MAX_BYTES`] read from any body,
/// - no per-attempt timeout.
///
/// Build and decode failures are never retried, whatever the configured predicates say.
///
/// # Examples
///
/// ```no_run
/// use retryer::{Context, HttpRetryer, MaxAttemptsMode};
/// use http::StatusCode;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> retryer::Result<()> {
/// let client = reqwest::Client::new();
/// let retryer = HttpRetryer::new()
///     .client(client.clone())
///     .max_attempts(MaxAttemptsMode::Total, 3)
///     .timeout(Duration::from_secs(10));
///
/// let user: User = retryer
///     .call(
///         &Context::background(),
///         |_ctx| Ok(client.get("https://api.example.com/users/123").build()?),
///         &[StatusCode::OK],
///     )
///     .await?;
/// println!("{} is user {}", user.name, user.id);
/// # Ok(())
/// # }
/// ```
pub struct HttpRetryer<D = ContentTypeDecoder> {
    transport: Arc<dyn Transport>,
    is_retryable: Predicate<Error>,
    is_retryable_status_code: StatusPredicate,
    is_early_return: Option<Predicate<Error>>,
    decoder: D,
    max_attempts_mode: MaxAttemptsMode,
    max_attempts: u8,
    backoff: Arc<dyn Backoff<Error>>,
    max_bytes: u64,
    timeout: Duration,
}

impl<D: Clone> Clone for HttpRetryer<D> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            is_retryable: Arc::clone(&self.is_retryable),
            is_retryable_status_code: Arc::clone(&self.is_retryable_status_code),
            is_early_return: self.is_early_return.clone(),
            decoder: self.decoder.clone(),
            max_attempts_mode: self.max_attempts_mode,
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            max_bytes: self.max_bytes,
            timeout: self.timeout,
        }
    }
}

impl<D> fmt::Debug for HttpRetryer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRetryer")
            .field("max_attempts_mode", &self.max_attempts_mode)
            .field("max_attempts", &self.max_attempts)
            .field("max_bytes", &self.max_bytes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpRetryer<ContentTypeDecoder> {
    /// Creates an adapter with the default configuration.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(reqwest::Client::new()),
            is_retryable: Arc::new(|_: &Context, err: &Error| err.is_retryable()),
            is_retryable_status_code: Arc::new(|_: &Context, status: StatusCode| {
                is_retryable_status_code(status)
            }),
            is_early_return: Some(Arc::new(|_: &Context, err: &Error| {
                err.as_status()
                    .is_some_and(|err| is_non_retryable_status_code(err.status))
            })),
            decoder: ContentTypeDecoder,
            max_attempts_mode: MaxAttemptsMode::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Arc::new(RetryAfter::default()),
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: Duration::ZERO,
        }
    }
}

impl Default for HttpRetryer<ContentTypeDecoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Decode> HttpRetryer<D> {
    /// Sets the transport executing requests.
    pub fn transport<Tr>(mut self, transport: Tr) -> Self
    where
        Tr: Transport + 'static,
    {
        self.transport = Arc::new(transport);
        self
    }

    /// Executes requests with `client`.
    pub fn client(self, client: reqwest::Client) -> Self {
        self.transport(client)
    }

    /// Sets the predicate deciding whether a failed attempt is transient.
    pub fn is_retryable_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Error) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(f);
        self
    }

    /// Sets the predicate deciding whether an unexpected status code is retryable. Its answer is
    /// recorded in [`StatusCodeError::is_retryable_status_code`].
    pub fn is_retryable_status_code_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, StatusCode) -> bool + Send + Sync + 'static,
    {
        self.is_retryable_status_code = Arc::new(f);
        self
    }

    /// Sets the early-return predicate, consulted only for non-retryable failures.
    pub fn is_early_return_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Error) -> bool + Send + Sync + 'static,
    {
        self.is_early_return = Some(Arc::new(f));
        self
    }

    /// Removes the early-return predicate.
    pub fn no_early_return(mut self) -> Self {
        self.is_early_return = None;
        self
    }

    /// Sets the decoder used by [`call`](Self::call).
    pub fn decoder<D2: Decode>(self, decoder: D2) -> HttpRetryer<D2> {
        HttpRetryer {
            transport: self.transport,
            is_retryable: self.is_retryable,
            is_retryable_status_code: self.is_retryable_status_code,
            is_early_return: self.is_early_return,
            decoder,
            max_attempts_mode: self.max_attempts_mode,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            max_bytes: self.max_bytes,
            timeout: self.timeout,
        }
    }

    /// Sets how failures are charged and the size of the attempt budget.
    pub fn max_attempts(mut self, mode: MaxAttemptsMode, max_attempts: u8) -> Self {
        self.max_attempts_mode = mode;
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the strategy run between attempts.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Backoff<Error> + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Sets the cap on bytes read from a response body, for decoding and for error capture.
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the timeout applied to each attempt individually. Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes the request built by `build` until a response with one of the `expected` status
    /// codes arrives. An empty `expected` accepts any status.
    ///
    /// `build` runs once per attempt and must produce a fresh request each time. The caller owns
    /// the returned response and its body.
    pub async fn send<B>(
        &self,
        ctx: &Context,
        mut build: B,
        expected: &[StatusCode],
    ) -> Result<reqwest::Response>
    where
        B: FnMut(&Context) -> std::result::Result<reqwest::Request, BoxError>,
    {
        self.retryer()
            .run(ctx, |attempt_ctx| {
                let request = build(&attempt_ctx);
                async move { self.attempt(&attempt_ctx, request, expected).await }
            })
            .await
    }

    /// Like [`send`](Self::send), decoding the body of the accepted response into `T`.
    ///
    /// The body is read up to the byte cap; a larger body fails with
    /// [`DecodeError::TooLarge`] rather than being decoded truncated. Decode failures are
    /// returned immediately.
    pub async fn call<T, B>(&self, ctx: &Context, mut build: B, expected: &[StatusCode]) -> Result<T>
    where
        T: DeserializeOwned,
        B: FnMut(&Context) -> std::result::Result<reqwest::Request, BoxError>,
    {
        self.retryer()
            .run(ctx, |attempt_ctx| {
                let request = build(&attempt_ctx);
                async move {
                    let response = self.attempt(&attempt_ctx, request, expected).await?;
                    self.decode(&attempt_ctx, response).await
                }
            })
            .await
    }

    fn retryer<T>(&self) -> Retryer<T, Error> {
        let is_retryable = Arc::clone(&self.is_retryable);
        let is_early_return = self.is_early_return.clone();

        Retryer::with_parts(
            Arc::new(move |ctx: &Context, err: &Error| {
                !err.is_terminal() && is_retryable(ctx, err)
            }),
            Some(Arc::new(move |ctx: &Context, err: &Error| {
                err.is_terminal()
                    || is_early_return
                        .as_ref()
                        .is_some_and(|is_early_return| is_early_return(ctx, err))
            })),
            self.max_attempts_mode,
            self.max_attempts,
            Arc::clone(&self.backoff),
            self.timeout,
        )
    }

    async fn attempt(
        &self,
        ctx: &Context,
        request: std::result::Result<reqwest::Request, BoxError>,
        expected: &[StatusCode],
    ) -> Result<reqwest::Response> {
        let request = request.map_err(Error::Build)?;

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Executing HTTP request"
        );

        let mut response = ctx
            .run(self.transport.execute(request))
            .await?
            .map_err(Error::Transport)?;

        let status = response.status();
        if expected.is_empty() || expected.contains(&status) {
            return Ok(response);
        }

        let body = ctx
            .run(response::capture_body(&mut response, self.max_bytes))
            .await
            .unwrap_or_default();
        self.drain(ctx, &mut response).await;

        let is_retryable_status_code = (self.is_retryable_status_code)(ctx, status);
        tracing::warn!(
            status = status.as_u16(),
            retryable = is_retryable_status_code,
            "Unexpected HTTP status code"
        );

        Err(StatusCodeError {
            status,
            is_retryable_status_code,
            headers: response.headers().clone(),
            body,
        }
        .into())
    }

    /// Discards what is left of the body so the connection can be reused. A context that fires
    /// mid-drain only costs the connection, so the attempt's outcome is unchanged.
    async fn drain(&self, ctx: &Context, response: &mut reqwest::Response) {
        if let Err(err) = ctx.run(response::drain(response, self.max_bytes)).await {
            tracing::trace!(error = %err, "Response body drain interrupted");
        }
    }

    async fn decode<T>(&self, ctx: &Context, mut response: reqwest::Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let (body, exceeded) = ctx
            .run(response::read_limited(&mut response, self.max_bytes))
            .await?
            .map_err(Error::transport)?;

        if exceeded {
            self.drain(ctx, &mut response).await;
            return Err(Error::Decode {
                status,
                source: DecodeError::TooLarge {
                    limit: self.max_bytes,
                },
            });
        }

        self.decoder
            .decode(ctx, status, response.headers(), &body, self.max_bytes)
            .map_err(|source| {
                tracing::debug!(status = status.as_u16(), error = %source, "Failed to decode response");
                Error::Decode { status, source }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TransientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with a connection reset until `failures` calls have been made, then answers 200.
    struct FlakyTransport {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn execute(
            &self,
            _request: reqwest::Request,
        ) -> std::result::Result<reqwest::Response, BoxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(
                    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into(),
                );
            }
            let response = http::Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .body(r#"{"ok":true}"#)?;
            Ok(response.into())
        }
    }

    fn request(_ctx: &Context) -> std::result::Result<reqwest::Request, BoxError> {
        Ok(reqwest::Client::new().get("http://localhost/").build()?)
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let retryer = HttpRetryer::new()
            .transport(Arc::clone(&transport))
            .backoff(crate::backoff::NoBackoff);

        let value: serde_json::Value = retryer
            .call(&Context::background(), request, &[StatusCode::OK])
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_build_errors_are_terminal() {
        let builds = AtomicUsize::new(0);
        let retryer = HttpRetryer::new()
            .is_retryable_fn(|_, _| true)
            .max_attempts(MaxAttemptsMode::Unlimited, 0)
            .backoff(crate::backoff::NoBackoff);

        let err = retryer
            .send(
                &Context::background(),
                |_ctx| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Err(TransientError::new("no url").into())
                },
                &[],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Build(_)));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
