use std::fmt;
use std::sync::Arc;

use reqwest::{header, Method};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    pipeline::{AttemptObserver, RequestPipeline},
    request::API_KEY_HEADER,
    ClientOptions, Request, ReqwestTransport, ResponseEnvelope, Result, ScanApiError,
};

/// Joins `base_url` and `path` with exactly one `/`.
///
/// Absolute `http://` / `https://` paths are returned unchanged.
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}

#[derive(Clone)]
/// HTTP client for the scanning API.
///
/// Every call runs through one shared [`RequestPipeline`]: failures come back
/// as a [`crate::DomainError`] kind or [`ScanApiError::Cancelled`], never as
/// raw status codes.
pub struct ScanApiClient {
    pipeline: Arc<RequestPipeline<ReqwestTransport>>,
    base_url: String,
    api_key: String,
    options: ClientOptions,
}

impl fmt::Debug for ScanApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl ScanApiClient {
    /// Creates a client with default options.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Creates a client with explicit timeout, retry and logging options.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let api_key = api_key.into();
        if base_url.trim().is_empty() {
            return Err(ScanApiError::Config("base URL cannot be empty".to_owned()));
        }
        if api_key.trim().is_empty() {
            return Err(ScanApiError::Config("API key cannot be empty".to_owned()));
        }
        header::HeaderValue::from_str(api_key.trim())
            .map_err(|_| ScanApiError::Config("API key is not a valid header value".to_owned()))?;
        options.validate()?;

        let transport = ReqwestTransport::new(&options)?;
        let mut pipeline =
            RequestPipeline::new(transport, options.retry).with_logging(options.logging);
        if let Some(observer) = slow_response_observer(&options) {
            pipeline = pipeline.with_observer(observer);
        }

        Ok(Self {
            pipeline: Arc::new(pipeline),
            base_url: base_url.trim().to_owned(),
            api_key: api_key.trim().to_owned(),
            options,
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `SCANAPI_BASE_URL`: API root (e.g. `https://api.example.com/v1`)
    /// - `SCANAPI_API_KEY`: credential sent in the `API-Key` header
    ///
    /// Returns an error if either variable is missing or empty.
    ///
    /// **Not available on `wasm32` targets**: environment variables do not
    /// exist in browser runtimes. Use [`ScanApiClient::new`] instead.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use scanapi_http::ScanApiClient;
    ///
    /// let client = ScanApiClient::from_env().expect("missing SCANAPI_* env vars");
    /// ```
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("SCANAPI_BASE_URL").map_err(|_| {
            ScanApiError::Config("missing SCANAPI_BASE_URL environment variable".to_owned())
        })?;
        let api_key = std::env::var("SCANAPI_API_KEY").map_err(|_| {
            ScanApiError::Config("missing SCANAPI_API_KEY environment variable".to_owned())
        })?;
        if base_url.trim().is_empty() {
            return Err(ScanApiError::Config(
                "SCANAPI_BASE_URL is set but empty".to_owned(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(ScanApiError::Config(
                "SCANAPI_API_KEY is set but empty".to_owned(),
            ));
        }
        Self::new(base_url, api_key)
    }

    /// Returns the API root every path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the options the client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Builds an authenticated request for `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<Request> {
        Request::new(method, join_url(&self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)?
            .header(header::ACCEPT.as_str(), "application/json")
    }

    /// Sends a prepared request through the retry pipeline.
    pub async fn send(&self, request: Request) -> Result<ResponseEnvelope> {
        self.pipeline.execute(&request).await
    }

    /// Like [`ScanApiClient::send`], stopping early when `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        self.pipeline.execute_with_cancel(&request, cancel).await
    }

    /// Fetches `path` and decodes the JSON payload.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_cancel(path, &CancellationToken::new()).await
    }

    /// Cancellable [`ScanApiClient::get`].
    pub async fn get_with_cancel<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let request = self.request(Method::GET, path)?;
        self.send_with_cancel(request, cancel).await?.json()
    }

    /// Posts `body` as JSON to `path` and decodes the JSON payload.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post_with_cancel(path, body, &CancellationToken::new())
            .await
    }

    /// Cancellable [`ScanApiClient::post`].
    pub async fn post_with_cancel<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body)?;
        self.send_with_cancel(request, cancel).await?.json()
    }

    /// Puts `body` as JSON to `path` and decodes the JSON payload.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put_with_cancel(path, body, &CancellationToken::new())
            .await
    }

    /// Cancellable [`ScanApiClient::put`].
    pub async fn put_with_cancel<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PUT, path)?.json(body)?;
        self.send_with_cancel(request, cancel).await?.json()
    }

    /// Deletes the resource at `path`; any success status is accepted.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.delete_with_cancel(path, &CancellationToken::new())
            .await
    }

    /// Cancellable [`ScanApiClient::delete`].
    pub async fn delete_with_cancel(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        let request = self.request(Method::DELETE, path)?;
        self.send_with_cancel(request, cancel).await?;
        Ok(())
    }
}

/// Reports responses slower than the configured threshold.
///
/// Returns `None` when there is nothing to report to.
fn slow_response_observer(options: &ClientOptions) -> Option<AttemptObserver> {
    #[cfg(feature = "tracing")]
    {
        let threshold = options.slow_response_ms?;
        if !options.logging {
            return None;
        }
        let observer: AttemptObserver = Arc::new(move |attempt: &crate::Attempt| {
            let elapsed_ms = attempt.elapsed.as_millis() as u64;
            if elapsed_ms > threshold {
                tracing::warn!(
                    attempt = attempt.index,
                    status = attempt.status(),
                    elapsed_ms,
                    "slow response from scanning API"
                );
            }
        });
        Some(observer)
    }

    #[cfg(not(feature = "tracing"))]
    {
        let _ = options;
        None
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::{join_url, slow_response_observer, ScanApiClient};
    use crate::{ClientOptions, ScanApiError};

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.test/v1/", "/scan/1"),
            "https://api.test/v1/scan/1"
        );
        assert_eq!(join_url("https://api.test/v1", "scan"), "https://api.test/v1/scan");
        assert_eq!(join_url("https://api.test/v1/", ""), "https://api.test/v1");
    }

    #[test]
    fn join_url_keeps_absolute_paths() {
        assert_eq!(
            join_url("https://api.test/v1", "https://cdn.test/result.json"),
            "https://cdn.test/result.json"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = ScanApiClient::new("https://api.test", "secret-key").expect("valid client");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn request_carries_credential_and_accept() {
        let client = ScanApiClient::new("https://api.test/v1", "k-123").expect("valid client");
        let request = client
            .request(Method::GET, "scans")
            .expect("valid request");
        assert_eq!(request.url(), "https://api.test/v1/scans");
        assert_eq!(request.headers()["API-Key"], "k-123");
        assert_eq!(request.headers()["accept"], "application/json");
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let err = ScanApiClient::new("https://api.test", "  ").expect_err("must reject");
        assert!(matches!(err, ScanApiError::Config(_)));
        let err = ScanApiClient::new("", "key").expect_err("must reject");
        assert!(matches!(err, ScanApiError::Config(_)));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let err = ScanApiClient::with_options(
            "https://api.test",
            "key",
            ClientOptions::default().with_timeout_ms(0),
        )
        .expect_err("must reject");
        assert!(matches!(err, ScanApiError::Config(_)));
    }

    #[test]
    fn logging_option_reaches_pipeline() {
        let options = ClientOptions {
            logging: false,
            ..ClientOptions::default()
        };
        let client =
            ScanApiClient::with_options("https://api.test", "key", options).expect("valid client");
        assert!(!client.pipeline.logging_enabled());

        let client = ScanApiClient::new("https://api.test", "key").expect("valid client");
        assert!(client.pipeline.logging_enabled());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn slow_response_observer_installed_with_threshold_and_logging() {
        let options = ClientOptions::default();
        assert!(slow_response_observer(&options).is_some());

        let client = ScanApiClient::new("https://api.test", "key").expect("valid client");
        assert!(client.pipeline.has_observer());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn slow_response_observer_skipped_without_threshold() {
        let options = ClientOptions {
            slow_response_ms: None,
            ..ClientOptions::default()
        };
        assert!(slow_response_observer(&options).is_none());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn slow_response_observer_skipped_when_logging_off() {
        let options = ClientOptions {
            logging: false,
            ..ClientOptions::default()
        };
        assert!(slow_response_observer(&options).is_none());

        let options = ClientOptions {
            logging: false,
            slow_response_ms: None,
            ..ClientOptions::default()
        };
        assert!(slow_response_observer(&options).is_none());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn slow_response_observer_accepts_fast_and_slow_attempts() {
        use std::time::Duration;

        use crate::{Attempt, AttemptOutcome, TransportFailure, TransportFailureKind};

        let options = ClientOptions {
            slow_response_ms: Some(10),
            ..ClientOptions::default()
        };
        let observer = slow_response_observer(&options).expect("observer must be installed");
        for elapsed in [Duration::from_millis(1), Duration::from_millis(50)] {
            observer(&Attempt {
                index: 0,
                outcome: AttemptOutcome::Failure(TransportFailure::new(
                    TransportFailureKind::Timeout,
                    "slow",
                )),
                elapsed,
            });
        }
    }

    #[cfg(not(feature = "tracing"))]
    #[test]
    fn slow_response_observer_needs_tracing_feature() {
        assert!(slow_response_observer(&ClientOptions::default()).is_none());
        let client = ScanApiClient::new("https://api.test", "key").expect("valid client");
        assert!(!client.pipeline.has_observer());
    }
}
