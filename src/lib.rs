//! `scanapi-http` is an async HTTP client for the hosted scanning API.
//!
//! Every call goes through one platform-independent [`RequestPipeline`]:
//! - [`classify`] turns error responses into a [`DomainError`]
//! - [`retry`] decides whether and when to try again
//! - a [`Transport`] (by default [`ReqwestTransport`]) performs the I/O
//!
//! [`ScanApiClient`] wraps the pipeline with authenticated JSON methods.

mod client;
mod error;
mod options;
mod platform;
mod request;
mod transport;

pub mod classify;
pub mod pipeline;
pub mod retry;

pub use client::{join_url, ScanApiClient};
pub use error::{DomainError, ScanApiError};
pub use options::{ClientOptions, RetryConfig};
pub use pipeline::{AttemptObserver, RequestPipeline};
pub use request::{Request, ResponseBody, ResponseEnvelope, API_KEY_HEADER, RETRY_COUNT_HEADER};
pub use retry::{Attempt, AttemptOutcome, RetryDecision};
pub use transport::{ReqwestTransport, Transport, TransportFailure, TransportFailureKind};

/// Cancellation signal accepted by the `*_with_cancel` methods.
pub use tokio_util::sync::CancellationToken;
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, ScanApiError>;
