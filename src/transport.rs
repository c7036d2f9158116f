use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    platform::now_millis, ClientOptions, Request, ResponseBody, ResponseEnvelope, Result,
    ScanApiError,
};

/// Why a transport produced no response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportFailureKind {
    Timeout,
    Connection,
    Cancelled,
    Other,
}

impl fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Network-level failure for one attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    /// Description of the underlying cause.
    pub cause: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

/// Performs the network call for a single attempt.
///
/// Implementations own connection pooling and per-attempt timeouts. They must
/// not retry on their own.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> std::result::Result<ResponseEnvelope, TransportFailure>;
}

/// [`Transport`] backed by `reqwest`.
///
/// On native targets this is a pooled hyper client; on `wasm32` reqwest
/// delegates to the Fetch API and only the overall timeout applies.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Builds a transport with the timeouts and user agent from `options`.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            http: build_http_client(options)?,
            timeout: Duration::from_millis(options.timeout_ms),
        })
    }

    /// Wraps an already configured client.
    pub fn from_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn build_http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(options.timeout_ms))
        .connect_timeout(Duration::from_millis(options.connect_timeout_ms))
        .read_timeout(Duration::from_millis(options.read_timeout_ms))
        .user_agent(options.user_agent.as_str())
        .build()
        .map_err(|err| ScanApiError::Config(format!("http client: {err}")))
}

#[cfg(target_arch = "wasm32")]
fn build_http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(options.user_agent.as_str())
        .build()
        .map_err(|err| ScanApiError::Config(format!("http client: {err}")))
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: Request,
    ) -> std::result::Result<ResponseEnvelope, TransportFailure> {
        let mut builder = self
            .http
            .request(request.method().clone(), request.url())
            .headers(request.headers().clone())
            .timeout(self.timeout);
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }

        let sent_at_ms = now_millis();
        let response = builder.send().await.map_err(failure_from_reqwest)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        // Body reads share the request timeout, so they are bounded.
        let body = match response.bytes().await {
            Ok(bytes) => ResponseBody::Bytes(bytes.to_vec()),
            Err(err) if status >= 400 => ResponseBody::Unavailable {
                reason: err.to_string(),
            },
            Err(err) => return Err(failure_from_reqwest(err)),
        };

        Ok(ResponseEnvelope {
            status,
            headers,
            body,
            sent_at_ms,
            received_at_ms: now_millis(),
        })
    }
}

fn failure_from_reqwest(err: reqwest::Error) -> TransportFailure {
    TransportFailure::new(failure_kind(&err), err.to_string())
}

fn failure_kind(err: &reqwest::Error) -> TransportFailureKind {
    // is_connect() is not available on wasm32 targets (no TCP)
    let connect = {
        #[cfg(not(target_arch = "wasm32"))]
        {
            err.is_connect()
        }
        #[cfg(target_arch = "wasm32")]
        {
            false
        }
    };

    if err.is_timeout() {
        TransportFailureKind::Timeout
    } else if connect || err.is_request() {
        TransportFailureKind::Connection
    } else {
        TransportFailureKind::Other
    }
}
