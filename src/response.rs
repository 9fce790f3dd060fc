//! Bounded response body handling and body decoding.
//!
//! Every body read by the HTTP adapter goes through [`read_limited`], so a misbehaving server can
//! never make a call buffer more than the configured byte cap. Unread remainders are discarded
//! with [`drain`] before the response is dropped, which lets the connection return to the pool.

use std::borrow::Cow;
use std::io::Read;

use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::DecodeError;

/// The default cap on bytes read from a response body: 2 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_XML: &str = "application/xml";

/// Reads at most `max_bytes` of the body.
///
/// Returns the bytes read and whether the body held more than `max_bytes`. The bytes beyond the
/// cap that were pulled off the wire with the last chunk are discarded.
pub async fn read_limited(
    response: &mut reqwest::Response,
    max_bytes: u64,
) -> Result<(Bytes, bool), reqwest::Error> {
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let mut buf = BytesMut::new();

    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf.freeze(), true));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok((buf.freeze(), false))
}

/// Captures up to `max_bytes` of the body for an error report.
///
/// Read failures are not reported: whatever was read before the failure is kept. Returns `None`
/// when nothing was captured.
pub async fn capture_body(response: &mut reqwest::Response, max_bytes: u64) -> Option<Bytes> {
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let mut buf = BytesMut::new();

    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::trace!(error = %err, "Failed to capture response body");
                break;
            }
        }
    }

    (!buf.is_empty()).then(|| buf.freeze())
}

/// Reads and discards up to `max_bytes` of whatever remains of the body.
pub async fn drain(response: &mut reqwest::Response, max_bytes: u64) {
    let mut drained = 0u64;
    while drained < max_bytes {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len() as u64,
            _ => break,
        }
    }
}

/// Decodes a fully read response body into a caller type.
///
/// `body` holds at most `max_bytes` bytes as they came off the wire. Implementations that expand
/// the body (decompression) must keep the expanded size within `max_bytes` as well.
///
/// # Examples
///
/// A decoder that accepts any content type as JSON:
///
/// ```
/// use retryer::{Context, DecodeError};
/// use retryer::response::Decode;
/// use http::{HeaderMap, StatusCode};
/// use serde::de::DeserializeOwned;
///
/// #[derive(Clone)]
/// struct AlwaysJson;
///
/// impl Decode for AlwaysJson {
///     fn decode<T: DeserializeOwned>(
///         &self,
///         _ctx: &Context,
///         _status: StatusCode,
///         _headers: &HeaderMap,
///         body: &[u8],
///         _max_bytes: u64,
///     ) -> Result<T, DecodeError> {
///         Ok(serde_json::from_slice(body)?)
///     }
/// }
/// ```
pub trait Decode: Send + Sync {
    /// Decodes `body` into `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        max_bytes: u64,
    ) -> Result<T, DecodeError>;
}

/// Decodes by `Content-Type`: `application/json` with serde_json and `application/xml` with
/// quick-xml. Media type parameters such as `charset` are ignored, and a gzip
/// `Content-Encoding` is inflated first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeDecoder;

impl Decode for ContentTypeDecoder {
    fn decode<T: DeserializeOwned>(
        &self,
        _ctx: &Context,
        _status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        max_bytes: u64,
    ) -> Result<T, DecodeError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let body = if is_gzip(headers) {
            Cow::Owned(gunzip(body, max_bytes)?)
        } else {
            Cow::Borrowed(body)
        };

        match media_type.as_str() {
            APPLICATION_JSON => Ok(serde_json::from_slice(&body)?),
            APPLICATION_XML => Ok(quick_xml::de::from_reader(body.as_ref())?),
            _ => Err(DecodeError::UnsupportedContentType(content_type.to_owned())),
        }
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"))
}

fn gunzip(body: &[u8], max_bytes: u64) -> Result<Vec<u8>, DecodeError> {
    let mut inflated = Vec::new();
    GzDecoder::new(body)
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Gzip)?;

    if inflated.len() as u64 > max_bytes {
        return Err(DecodeError::TooLarge { limit: max_bytes });
    }
    Ok(inflated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use http::HeaderValue;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u64,
        name: String,
    }

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    fn decode<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, DecodeError> {
        ContentTypeDecoder.decode(
            &Context::background(),
            StatusCode::OK,
            headers,
            body,
            DEFAULT_MAX_BYTES,
        )
    }

    fn gzip(body: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_json_with_charset() {
        let item: Item = decode(
            &headers("application/json; charset=utf-8"),
            br#"{"id":1,"name":"widget"}"#,
        )
        .unwrap();

        assert_eq!(
            item,
            Item {
                id: 1,
                name: "widget".into()
            }
        );
    }

    #[test]
    fn test_decode_xml() {
        let item: Item = decode(
            &headers("application/xml"),
            b"<Item><id>7</id><name>gear</name></Item>",
        )
        .unwrap();

        assert_eq!(item.id, 7);
        assert_eq!(item.name, "gear");
    }

    #[test]
    fn test_decode_gzip_json() {
        let mut headers = headers("application/json");
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let body = gzip(br#"{"id":2,"name":"sprocket"}"#);

        let item: Item = decode(&headers, &body).unwrap();
        assert_eq!(item.name, "sprocket");
    }

    #[test]
    fn test_gzip_expansion_is_capped() {
        let mut headers = headers("application/json");
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let body = gzip(&vec![b' '; 4096]);

        let err = ContentTypeDecoder
            .decode::<Item>(&Context::background(), StatusCode::OK, &headers, &body, 1024)
            .unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { limit: 1024 }));
    }

    #[test]
    fn test_decode_errors() {
        let err = decode::<Item>(&headers("text/plain"), b"hello").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedContentType(ref t) if t == "text/plain"));

        let err = decode::<Item>(&HeaderMap::new(), b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedContentType(_)));

        let err = decode::<Item>(&headers("application/json"), b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));

        let mut gz_headers = headers("application/json");
        gz_headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let err = decode::<Item>(&gz_headers, b"not gzip").unwrap_err();
        assert!(matches!(err, DecodeError::Gzip(_)));
    }

    fn response(body: &'static [u8]) -> reqwest::Response {
        reqwest::Response::from(http::Response::new(body))
    }

    #[tokio::test]
    async fn test_read_limited() {
        let mut resp = response(b"hello world");
        let (body, exceeded) = read_limited(&mut resp, 64).await.unwrap();
        assert_eq!(&body[..], b"hello world");
        assert!(!exceeded);

        let mut resp = response(b"hello world");
        let (body, exceeded) = read_limited(&mut resp, 5).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert!(exceeded);

        let mut resp = response(b"hello");
        let (body, exceeded) = read_limited(&mut resp, 5).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert!(!exceeded);
    }

    #[tokio::test]
    async fn test_capture_body() {
        let mut resp = response(b"boom");
        assert_eq!(capture_body(&mut resp, 1024).await.as_deref(), Some(&b"boom"[..]));

        let mut resp = response(b"0123456789");
        assert_eq!(capture_body(&mut resp, 4).await.as_deref(), Some(&b"0123"[..]));

        let mut resp = response(b"");
        assert_eq!(capture_body(&mut resp, 4).await, None);
    }
}
