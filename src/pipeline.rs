//! Attempt loop shared by every platform.
//!
//! The pipeline is the only place that performs I/O (through a [`Transport`])
//! or sleeps. Classification and retry decisions are delegated to
//! [`crate::classify`] and [`crate::retry`].

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{select, Either};
use rand::{rngs::SmallRng, SeedableRng};
use reqwest::header::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::{
    classify::{classify, classify_transport, parse_retry_after},
    platform::{sleep, Stopwatch},
    request::RETRY_COUNT_HEADER,
    retry::{decide, Attempt, AttemptOutcome, RetryDecision},
    DomainError, Request, ResponseEnvelope, Result, RetryConfig, ScanApiError, Transport,
    TransportFailureKind,
};

/// Hook invoked once per finished attempt, before the retry decision.
pub type AttemptObserver = Arc<dyn Fn(&Attempt) + Send + Sync>;

/// Drives one logical call through repeated transport attempts.
///
/// Holds only read-only configuration, so one pipeline can serve any number
/// of concurrent calls.
pub struct RequestPipeline<T> {
    transport: T,
    config: RetryConfig,
    observer: Option<AttemptObserver>,
    logging: bool,
}

impl<T: std::fmt::Debug> std::fmt::Debug for RequestPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .field("logging", &self.logging)
            .finish()
    }
}

impl<T: Transport> RequestPipeline<T> {
    /// Creates a pipeline over `transport` with logging on and no observer.
    pub fn new(transport: T, config: RetryConfig) -> Self {
        Self {
            transport,
            config,
            observer: None,
            logging: true,
        }
    }

    /// Installs a hook called once per finished attempt.
    pub fn with_observer(mut self, observer: AttemptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Toggles the pipeline's own log events (`tracing` feature only).
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Retry bounds applied to every call.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the pipeline emits its own log events.
    pub fn logging_enabled(&self) -> bool {
        self.logging
    }

    /// Whether an attempt observer is installed.
    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Runs `request` to a single terminal outcome without external cancellation.
    pub async fn execute(&self, request: &Request) -> Result<ResponseEnvelope> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Runs `request` until success, a non-retryable failure, an exhausted
    /// attempt budget, or cancellation.
    ///
    /// On failure the returned error always reflects the last attempt.
    /// Cancellation interrupts both in-flight transport calls and
    /// inter-attempt delays and yields [`ScanApiError::Cancelled`].
    pub async fn execute_with_cancel(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        // Per-call source so concurrent calls do not share backoff jitter.
        let mut rng = SmallRng::from_entropy();
        let mut history: Vec<Attempt> = Vec::new();
        let mut last_retry_after: Option<Duration> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ScanApiError::Cancelled);
            }

            let index = history.len() as u32;
            let outgoing = annotate_retry(request, index);
            let stopwatch = Stopwatch::start();

            let outcome = match until_cancelled(cancel, self.transport.send(outgoing)).await {
                None => return Err(ScanApiError::Cancelled),
                Some(Err(failure)) if failure.kind == TransportFailureKind::Cancelled => {
                    return Err(ScanApiError::Cancelled)
                }
                Some(Err(failure)) => AttemptOutcome::Failure(failure),
                Some(Ok(response)) => AttemptOutcome::Response(response),
            };
            let attempt = Attempt {
                index,
                outcome,
                elapsed: stopwatch.elapsed(),
            };

            if let Some(observer) = &self.observer {
                observer(&attempt);
            }

            let attempt = match attempt.outcome {
                AttemptOutcome::Response(response) if !response.is_error() => {
                    return Ok(response)
                }
                outcome => Attempt { outcome, ..attempt },
            };
            if let AttemptOutcome::Response(response) = &attempt.outcome {
                if let Some(wait) = parse_retry_after(&response.headers) {
                    last_retry_after = Some(wait);
                }
            }

            match decide(&attempt, index + 1, &self.config, &mut rng) {
                RetryDecision::Stop => {
                    let err = terminal_error(request.url(), &attempt, last_retry_after);
                    history.push(attempt);
                    self.log_failure(request, &history, &err);
                    return Err(err.into());
                }
                RetryDecision::Retry { after } => {
                    self.log_retry(request, &attempt, after);
                    history.push(attempt);
                    if until_cancelled(cancel, sleep(after)).await.is_none() {
                        return Err(ScanApiError::Cancelled);
                    }
                }
            }
        }
    }

    #[allow(unused_variables)]
    fn log_retry(&self, request: &Request, attempt: &Attempt, after: Duration) {
        #[cfg(feature = "tracing")]
        {
            if !self.logging {
                return;
            }
            let cause = match &attempt.outcome {
                AttemptOutcome::Response(response) => format!("status {}", response.status),
                AttemptOutcome::Failure(failure) => failure.to_string(),
            };
            tracing::debug!(
                url = request.url(),
                attempt = attempt.index,
                delay_ms = after.as_millis() as u64,
                "retrying request after {cause}"
            );
        }
    }

    #[allow(unused_variables)]
    fn log_failure(&self, request: &Request, history: &[Attempt], err: &DomainError) {
        #[cfg(feature = "tracing")]
        {
            if !self.logging {
                return;
            }
            let statuses: Vec<String> = history
                .iter()
                .map(|attempt| match attempt.status() {
                    Some(status) => status.to_string(),
                    None => "transport".to_owned(),
                })
                .collect();
            tracing::debug!(
                url = request.url(),
                attempts = history.len(),
                history = %statuses.join(","),
                "request failed: {err}"
            );
        }
    }
}

/// Copy of `request` carrying the attempt count on retries only.
fn annotate_retry(request: &Request, index: u32) -> Request {
    if index == 0 {
        return request.clone();
    }
    request.with_header(
        HeaderName::from_static(RETRY_COUNT_HEADER),
        HeaderValue::from(index),
    )
}

/// Classifies the last attempt.
///
/// A rate limit without its own `Retry-After` inherits the most recent one
/// the server sent during this call.
fn terminal_error(url: &str, attempt: &Attempt, last_retry_after: Option<Duration>) -> DomainError {
    let err = match &attempt.outcome {
        AttemptOutcome::Response(response) => {
            classify(url, response.status, &response.body, &response.headers)
        }
        AttemptOutcome::Failure(failure) => classify_transport(url, failure),
    };
    match err {
        DomainError::RateLimited {
            retry_after: None,
            message,
        } => DomainError::RateLimited {
            retry_after: last_retry_after,
            message,
        },
        other => other,
    }
}

/// Resolves to `None` as soon as `cancel` fires. Cancellation wins ties.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    let cancelled = pin!(cancel.cancelled());
    let future = pin!(future);
    match select(cancelled, future).await {
        Either::Left(_) => None,
        Either::Right((output, _)) => Some(output),
    }
}
