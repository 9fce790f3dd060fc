//! Retry classification for errors and HTTP status codes.
//!
//! Errors advertise retryability through the [`Retryable`] capability, or are recognised by
//! walking their `source()` chain for well-known transient conditions (connection resets,
//! timeouts, and so on). Status codes are split into a retryable set and a set that will never
//! succeed on retry, the latter driving early return.

use std::error::Error as StdError;
use std::io;

use http::StatusCode;

use crate::context::ContextError;

/// Capability implemented by errors that know whether retrying may succeed.
pub trait Retryable {
    /// Returns `true` if the failure is transient.
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::Error {
    fn is_retryable(&self) -> bool {
        crate::Error::is_retryable(self)
    }
}

impl Retryable for crate::StatusCodeError {
    fn is_retryable(&self) -> bool {
        self.is_retryable_status_code
    }
}

impl Retryable for ContextError {
    fn is_retryable(&self) -> bool {
        matches!(self, ContextError::DeadlineExceeded)
    }
}

/// Marks an arbitrary error as transient.
///
/// Transports and operations wrap failures they know to be retryable; the classifiers in this
/// module find the wrapper anywhere in an error's source chain.
///
/// # Examples
///
/// ```
/// use retryer::classify::{is_retryable_network_error, TransientError};
///
/// let err = TransientError::new("upstream busy");
/// assert!(is_retryable_network_error(&err));
/// ```
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct TransientError(#[source] crate::BoxError);

impl TransientError {
    /// Wraps `err` as a transient failure.
    pub fn new(err: impl Into<crate::BoxError>) -> Self {
        Self(err.into())
    }

    /// Returns the wrapped error.
    pub fn into_inner(self) -> crate::BoxError {
        self.0
    }
}

impl Retryable for TransientError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Returns the reason `err` is a retryable network failure, or `None` if it is not one.
///
/// The reason is a short, stable label suitable for logs and metrics.
pub fn retryable_network_reason(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(reason) = reason_for(err) {
            return Some(reason);
        }
        current = err.source();
    }
    None
}

/// Returns `true` if `err` is a retryable network failure.
pub fn is_retryable_network_error(err: &(dyn StdError + 'static)) -> bool {
    retryable_network_reason(err).is_some()
}

/// Like [`retryable_network_reason`], additionally recognising HTTP connection-level conditions:
/// an HTTP/2 GOAWAY, or a server closing an idle keep-alive connection mid-request.
pub fn retryable_http_reason(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    if let Some(reason) = retryable_network_reason(err) {
        return Some(reason);
    }

    let mut current = Some(err);
    while let Some(err) = current {
        let message = err.to_string();
        if message.contains("GOAWAY") {
            return Some("goaway");
        }
        if message.contains("connection closed before message completed") {
            return Some("server_close_idle_connection");
        }
        current = err.source();
    }
    None
}

fn reason_for(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    if err.is::<TransientError>() {
        return Some("retryable");
    }
    if let Some(err) = err.downcast_ref::<crate::Error>() {
        return crate::Error::is_retryable(err).then_some("retryable");
    }
    if let Some(err) = err.downcast_ref::<crate::StatusCodeError>() {
        return err.is_retryable().then_some("retryable");
    }
    if let Some(err) = err.downcast_ref::<ContextError>() {
        return err.is_retryable().then_some("timeout");
    }
    // Connect failures are classified by their io source: a refused connection is not transient.
    if let Some(err) = err.downcast_ref::<reqwest::Error>() {
        return err.is_timeout().then_some("timeout");
    }
    if let Some(err) = err.downcast_ref::<io::Error>() {
        return io_reason(err.kind());
    }
    None
}

fn io_reason(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionReset => Some("econnreset"),
        io::ErrorKind::ConnectionAborted => Some("econnaborted"),
        io::ErrorKind::NotConnected => Some("enotconn"),
        io::ErrorKind::WouldBlock => Some("ewouldblock"),
        io::ErrorKind::TimedOut => Some("etimedout"),
        io::ErrorKind::Interrupted => Some("eintr"),
        io::ErrorKind::BrokenPipe => Some("epipe"),
        _ => None,
    }
}

/// Returns `true` if `status` is commonly transient: 408, 429, 502, 503, 504, and 524 (an origin
/// timeout reported by Cloudflare).
///
/// # Examples
///
/// ```
/// use retryer::classify::is_retryable_status_code;
/// use http::StatusCode;
///
/// assert!(is_retryable_status_code(StatusCode::SERVICE_UNAVAILABLE));
/// assert!(!is_retryable_status_code(StatusCode::INTERNAL_SERVER_ERROR));
/// ```
pub fn is_retryable_status_code(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 502 | 503 | 504 | 524)
}

/// Returns `true` if `status` will not succeed on retry, for example 400, 401, 404 or 501.
pub fn is_non_retryable_status_code(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        400 | 401
            | 403
            | 404
            | 405
            | 406
            | 407
            | 409
            | 411
            | 412
            | 413
            | 414
            | 415
            | 416
            | 417
            | 418
            | 421
            | 422
            | 428
            | 431
            | 451
            | 501
            | 505
            | 508
            | 510
            | 511
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(thiserror::Error, Debug)]
    #[error("request failed")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn test_io_kinds() {
        for (kind, reason) in [
            (io::ErrorKind::ConnectionReset, "econnreset"),
            (io::ErrorKind::ConnectionAborted, "econnaborted"),
            (io::ErrorKind::NotConnected, "enotconn"),
            (io::ErrorKind::WouldBlock, "ewouldblock"),
            (io::ErrorKind::TimedOut, "etimedout"),
            (io::ErrorKind::Interrupted, "eintr"),
            (io::ErrorKind::BrokenPipe, "epipe"),
        ] {
            let err = io::Error::new(kind, "boom");
            assert_eq!(retryable_network_reason(&err), Some(reason));
        }

        for kind in [
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::NotFound,
        ] {
            let err = io::Error::new(kind, "nope");
            assert_eq!(retryable_network_reason(&err), None, "{kind:?}");
        }
    }

    #[test]
    fn test_walks_source_chain() {
        let err = Wrapper(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(retryable_network_reason(&err), Some("econnreset"));
    }

    #[test]
    fn test_transient_and_context() {
        assert!(is_retryable_network_error(&TransientError::new("busy")));
        assert!(is_retryable_network_error(&ContextError::DeadlineExceeded));
        assert!(!is_retryable_network_error(&ContextError::Canceled));
    }

    #[test]
    fn test_status_code_errors() {
        let status_error = |status: StatusCode, retryable: bool| crate::StatusCodeError {
            status,
            is_retryable_status_code: retryable,
            headers: http::HeaderMap::new(),
            body: None,
        };

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, true);
        assert_eq!(retryable_network_reason(&unavailable), Some("retryable"));

        let bad_request = status_error(StatusCode::BAD_REQUEST, false);
        assert!(!is_retryable_network_error(&bad_request));

        // Boxed by a custom transport.
        let wrapped = crate::Error::transport(status_error(StatusCode::TOO_MANY_REQUESTS, true));
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn test_http_reasons() {
        let err = io::Error::new(io::ErrorKind::Other, "http2: server sent GOAWAY");
        assert_eq!(retryable_http_reason(&err), Some("goaway"));
        assert_eq!(retryable_network_reason(&err), None);

        let err = io::Error::new(
            io::ErrorKind::Other,
            "connection closed before message completed",
        );
        assert_eq!(
            retryable_http_reason(&err),
            Some("server_close_idle_connection")
        );
    }

    #[test]
    fn test_status_code_sets() {
        for code in [408, 429, 502, 503, 504, 524] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(is_retryable_status_code(status), "{code}");
            assert!(!is_non_retryable_status_code(status), "{code}");
        }
        for code in [400, 401, 403, 404, 405, 409, 413, 422, 501] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(is_non_retryable_status_code(status), "{code}");
            assert!(!is_retryable_status_code(status), "{code}");
        }
        assert!(!is_retryable_status_code(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_non_retryable_status_code(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
