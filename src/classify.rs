//! Translation of error responses and transport failures into [`DomainError`].
//!
//! Classification never fails: when the body cannot be read or parsed the
//! message degrades to a generic or failure-derived detail.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value as JsonValue;

use crate::{request::excerpt, DomainError, ResponseBody, TransportFailure};

const DETAIL_LIMIT: usize = 512;

/// Classifies an error response (status >= 400) for `url`.
pub fn classify(url: &str, status: u16, body: &ResponseBody, headers: &HeaderMap) -> DomainError {
    match status {
        401 | 403 => DomainError::Authentication {
            status_code: status,
            message: format!("request to {url} was rejected with status {status}; check the API key"),
        },
        404 => DomainError::NotFound {
            message: match body_detail(body) {
                Some(detail) => format!("resource not found at {url}: {detail}"),
                None => format!("resource not found at {url}"),
            },
        },
        429 => {
            let retry_after = parse_retry_after(headers);
            let message = match retry_after {
                Some(wait) => format!(
                    "too many requests to {url}; server asked to wait {}s",
                    wait.as_secs()
                ),
                None => format!("too many requests to {url}"),
            };
            DomainError::RateLimited {
                retry_after,
                message,
            }
        }
        400 => DomainError::Api {
            status_code: 400,
            message: format!("bad request to {url}: {}", detail_or_generic(body)),
        },
        500..=599 => DomainError::Api {
            status_code: status,
            message: format!(
                "server error {status} from {url}: {}",
                detail_or_generic(body)
            ),
        },
        _ => DomainError::Api {
            status_code: status,
            message: format!("unexpected status {status} from {url}"),
        },
    }
}

/// Classifies a transport failure that will not be retried further.
pub fn classify_transport(url: &str, failure: &TransportFailure) -> DomainError {
    DomainError::Transport {
        kind: failure.kind,
        message: format!("request to {url} failed: {}", failure.cause),
    }
}

/// Parses `Retry-After` as whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn detail_or_generic(body: &ResponseBody) -> String {
    body_detail(body).unwrap_or_else(|| "no error detail provided".to_owned())
}

/// Best-effort detail string from an error body.
///
/// Prefers a message field from a JSON error document, otherwise the body
/// text itself. A failed body read yields the read failure description.
fn body_detail(body: &ResponseBody) -> Option<String> {
    let bytes = match body {
        ResponseBody::Bytes(bytes) => bytes,
        ResponseBody::Unavailable { reason } => {
            return Some(format!("response body unavailable ({reason})"))
        }
    };

    if let Ok(document) = serde_json::from_slice::<JsonValue>(bytes) {
        if let Some(message) = json_message(&document) {
            return Some(excerpt(message.as_bytes(), DETAIL_LIMIT));
        }
    }

    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| excerpt(text.as_bytes(), DETAIL_LIMIT))
}

fn json_message(document: &JsonValue) -> Option<&str> {
    ["message", "detail", "description", "error"]
        .iter()
        .find_map(|key| match document.get(*key)? {
            JsonValue::String(text) if !text.trim().is_empty() => Some(text.as_str()),
            nested @ JsonValue::Object(_) => json_message(nested),
            _ => None,
        })
}
