//! Error types for retried HTTP calls.
//!
//! The HTTP adapter surfaces every failure as an [`Error`]. Unexpected status codes become a
//! [`StatusCodeError`] that keeps the response headers and a size-capped copy of the body, so the
//! original failure can still be inspected after all attempts are exhausted.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::context::ContextError;

/// A boxed error supplied by a caller, such as a request builder or a custom transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for retried HTTP calls.
///
/// # Examples
///
/// ```no_run
/// use retryer::{Context, Error, HttpRetryer};
/// use http::StatusCode;
///
/// # async fn example() {
/// let retryer = HttpRetryer::new();
/// let client = reqwest::Client::new();
///
/// let result = retryer
///     .call::<serde_json::Value, _>(
///         &Context::background(),
///         |_ctx| Ok(client.get("https://api.example.com/items").build()?),
///         &[StatusCode::OK],
///     )
///     .await;
///
/// match result {
///     Ok(value) => println!("Success: {value}"),
///     Err(Error::Status(err)) => {
///         eprintln!("HTTP {} body: {:?}", err.status, err.body);
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request could not be constructed.
    ///
    /// Always terminal: a request that cannot be built will not build on the next attempt either.
    #[error("failed to build request: {0}")]
    Build(#[source] BoxError),

    /// The transport failed to complete the round trip, or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The server answered with a status code outside the expected set.
    #[error(transparent)]
    Status(#[from] StatusCodeError),

    /// The response body could not be decoded into the requested type.
    ///
    /// Always terminal: it indicates a response contract violation, not a transient failure.
    #[error("failed to decode response (status {status}): {source}")]
    Decode {
        /// The status code of the response that failed to decode.
        status: StatusCode,
        /// The underlying decode failure.
        #[source]
        source: DecodeError,
    },

    /// The attempt's context was cancelled or its deadline passed.
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl Error {
    /// Wraps a transport failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Error::Transport(err.into())
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Status errors defer to [`StatusCodeError::is_retryable_status_code`], transport errors are
    /// classified by [`retryable_http_reason`](crate::classify::retryable_http_reason), and a
    /// per-attempt deadline is retryable while cancellation is not. Build and decode errors never
    /// are.
    ///
    /// # Examples
    ///
    /// ```
    /// use retryer::{Error, StatusCodeError};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = Error::Status(StatusCodeError {
    ///     status: StatusCode::SERVICE_UNAVAILABLE,
    ///     is_retryable_status_code: true,
    ///     headers: HeaderMap::new(),
    ///     body: None,
    /// });
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Context(retryer::ContextError::Canceled);
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Build(_) => false,
            Error::Transport(err) => {
                crate::classify::retryable_http_reason(err.as_ref()).is_some()
            }
            Error::Status(err) => err.is_retryable_status_code,
            Error::Decode { .. } => false,
            Error::Context(err) => matches!(err, ContextError::DeadlineExceeded),
        }
    }

    /// Returns `true` if no retry policy should ever retry this error.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Error::Build(_) | Error::Decode { .. })
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(err) => Some(err.status),
            Error::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the captured response body of a status error.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Error::Status(err) => err.body.as_deref(),
            _ => None,
        }
    }

    /// Returns the response headers of a status error.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Error::Status(err) => Some(&err.headers),
            _ => None,
        }
    }

    /// Returns the status error, if this is one.
    pub fn as_status(&self) -> Option<&StatusCodeError> {
        match self {
            Error::Status(err) => Some(err),
            _ => None,
        }
    }
}

/// An HTTP response whose status code was not among the caller's expected codes.
#[derive(thiserror::Error, Debug, Clone)]
#[error("status code encountered: {}", status.as_u16())]
pub struct StatusCodeError {
    /// The response status code.
    pub status: StatusCode,

    /// Whether the configured status predicate considered the code retryable.
    pub is_retryable_status_code: bool,

    /// The response headers.
    pub headers: HeaderMap,

    /// The response body, truncated at the configured byte cap. `None` when the body was empty.
    pub body: Option<Bytes>,
}

impl StatusCodeError {
    /// Returns the captured body as UTF-8 text, replacing invalid sequences.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }
}

/// Failure to decode a response body.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The body was not valid JSON for the target type.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The body was not valid XML for the target type.
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// The body could not be decompressed.
    #[error("invalid gzip body: {0}")]
    Gzip(#[source] std::io::Error),

    /// The body exceeded the configured byte cap.
    #[error("response body exceeds limit of {limit} bytes")]
    TooLarge {
        /// The configured cap.
        limit: u64,
    },

    /// The response Content-Type has no decoder.
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// A custom decoder failed.
    #[error("custom decoder failed: {0}")]
    Custom(#[source] BoxError),
}

/// A specialized `Result` type for retried HTTP calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(code: u16, retryable: bool) -> Error {
        Error::Status(StatusCodeError {
            status: StatusCode::from_u16(code).unwrap(),
            is_retryable_status_code: retryable,
            headers: HeaderMap::new(),
            body: Some(Bytes::from_static(b"boom")),
        })
    }

    #[test]
    fn test_status_error_display() {
        let err = status_error(500, false);
        assert_eq!(err.to_string(), "status code encountered: 500");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.body(), Some(&b"boom"[..]));
    }

    #[test]
    fn test_is_retryable() {
        assert!(status_error(503, true).is_retryable());
        assert!(!status_error(500, false).is_retryable());
        assert!(Error::Context(ContextError::DeadlineExceeded).is_retryable());
        assert!(!Error::Context(ContextError::Canceled).is_retryable());
        assert!(!Error::Build("bad url".into()).is_retryable());

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::transport(reset).is_retryable());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!Error::transport(denied).is_retryable());
    }

    #[test]
    fn test_terminal_errors() {
        assert!(Error::Build("bad url".into()).is_terminal());
        assert!(Error::Decode {
            status: StatusCode::OK,
            source: DecodeError::UnsupportedContentType("text/plain".into()),
        }
        .is_terminal());
        assert!(!status_error(400, false).is_terminal());
    }
}
