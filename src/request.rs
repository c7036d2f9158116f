use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Result, ScanApiError};

/// Credential header attached to every call.
pub const API_KEY_HEADER: &str = "api-key";
/// Diagnostic header carrying the attempt count on retried requests.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// A fully-formed request handed to a [`crate::Transport`].
///
/// Immutable once built; [`Request::with_header`] returns a modified copy.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<_> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.as_str() == API_KEY_HEADER {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.to_str().unwrap_or("<binary>"))
                }
            })
            .collect();
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds or replaces a header, validating name and value.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ScanApiError::InvalidRequest(format!("header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| ScanApiError::InvalidRequest(format!("header value for '{name}': {err}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Returns a copy with `name` set to `value`. `self` is left untouched.
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut next = self.clone();
        next.headers.insert(name, value);
        next
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets `content-type`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|err| ScanApiError::InvalidRequest(format!("request body: {err}")))?;
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(body);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Response body as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    Bytes(Vec<u8>),
    /// Body could not be read; `reason` describes the read failure.
    Unavailable { reason: String },
}

impl ResponseBody {
    /// Raw body, or `None` when it could not be read.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Unavailable { .. } => None,
        }
    }
}

/// One server answer, produced once per attempt.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Milliseconds since the Unix epoch when the request went out.
    pub sent_at_ms: u64,
    /// Milliseconds since the Unix epoch when the response arrived.
    pub received_at_ms: u64,
}

impl ResponseEnvelope {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.received_at_ms.saturating_sub(self.sent_at_ms))
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = match &self.body {
            ResponseBody::Bytes(bytes) => bytes.as_slice(),
            ResponseBody::Unavailable { reason } => {
                return Err(ScanApiError::Decode(format!(
                    "response body unavailable: {reason}"
                )))
            }
        };
        let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            bytes
        };
        serde_json::from_slice(bytes).map_err(|err| {
            ScanApiError::Decode(format!(
                "invalid response JSON: {err}; body: {}",
                excerpt(bytes, 256)
            ))
        })
    }
}

/// Lossy UTF-8 prefix of `bytes`, at most `limit` characters.
pub(crate) fn excerpt(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out: String = text.chars().take(limit).collect();
    if text.chars().count() > limit {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use reqwest::Method;
    use serde_json::Value as JsonValue;

    use super::{excerpt, Request, ResponseBody, ResponseEnvelope, API_KEY_HEADER};
    use crate::ScanApiError;

    fn envelope(body: ResponseBody) -> ResponseEnvelope {
        ResponseEnvelope {
            status: 200,
            headers: HeaderMap::new(),
            body,
            sent_at_ms: 1_000,
            received_at_ms: 1_250,
        }
    }

    #[test]
    fn with_header_leaves_original_untouched() {
        let original = Request::new(Method::GET, "https://api.test/scans");
        let retried = original.with_header(
            HeaderName::from_static("x-retry-count"),
            HeaderValue::from_static("1"),
        );
        assert!(original.headers().get("x-retry-count").is_none());
        assert_eq!(retried.headers()["x-retry-count"], "1");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let request = Request::new(Method::GET, "https://api.test")
            .header("API-Key", "k1")
            .and_then(|req| req.header("api-key", "k2"))
            .expect("valid headers");
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.headers()[API_KEY_HEADER], "k2");
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let err = Request::new(Method::GET, "https://api.test")
            .header("x-note", "line\nbreak")
            .expect_err("must reject newline");
        assert!(matches!(err, ScanApiError::InvalidRequest(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let request = Request::new(Method::GET, "https://api.test")
            .header(API_KEY_HEADER, "secret-key")
            .expect("valid header");
        let debug = format!("{request:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let value: JsonValue = envelope(ResponseBody::Bytes(Vec::new()))
            .json()
            .expect("empty body is null");
        assert_eq!(value, JsonValue::Null);
    }

    #[test]
    fn elapsed_uses_timestamps() {
        let env = envelope(ResponseBody::Bytes(Vec::new()));
        assert_eq!(env.elapsed().as_millis(), 250);
    }

    #[test]
    fn body_bytes_only_when_readable() {
        let body = ResponseBody::Bytes(b"{}".to_vec());
        assert_eq!(body.bytes(), Some(&b"{}"[..]));

        let body = ResponseBody::Unavailable {
            reason: "connection reset".to_owned(),
        };
        assert_eq!(body.bytes(), None);
    }

    #[test]
    fn header_lookup_ignores_case_and_bad_values() {
        let mut env = envelope(ResponseBody::Bytes(Vec::new()));
        env.headers.insert("retry-after", HeaderValue::from_static("12"));
        env.headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[0xff, 0xfe]).expect("opaque bytes are a valid value"),
        );
        assert_eq!(env.header("Retry-After"), Some("12"));
        assert_eq!(env.header("x-binary"), None);
        assert_eq!(env.header("x-absent"), None);
    }

    #[test]
    fn unavailable_body_is_a_decode_error() {
        let err = envelope(ResponseBody::Unavailable {
            reason: "reset".to_owned(),
        })
        .json::<JsonValue>()
        .expect_err("unreadable body cannot decode");
        assert!(matches!(err, ScanApiError::Decode(message) if message.contains("reset")));
    }

    #[test]
    fn excerpt_truncates_long_text() {
        assert_eq!(excerpt(b"abcdef", 3), "abc…");
        assert_eq!(excerpt(b"abc", 3), "abc");
    }
}
