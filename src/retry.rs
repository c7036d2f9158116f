//! Retry eligibility and delay computation.
//!
//! Everything here is pure apart from the caller-supplied random source used
//! for jitter.

use std::time::Duration;

use rand::Rng;

use crate::{
    classify::parse_retry_after, ResponseEnvelope, RetryConfig, TransportFailure,
    TransportFailureKind,
};

/// What a single attempt produced.
#[derive(Clone, Debug)]
pub enum AttemptOutcome {
    Response(ResponseEnvelope),
    Failure(TransportFailure),
}

/// One request/response or request/failure cycle within a call.
#[derive(Clone, Debug)]
pub struct Attempt {
    /// 0-based position within the call.
    pub index: u32,
    pub outcome: AttemptOutcome,
    /// Monotonic time spent on this attempt.
    pub elapsed: Duration,
}

impl Attempt {
    pub fn status(&self) -> Option<u16> {
        match &self.outcome {
            AttemptOutcome::Response(response) => Some(response.status),
            AttemptOutcome::Failure(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    Retry { after: Duration },
    Stop,
}

/// Whether the outcome is transient and worth another attempt.
pub fn is_retry_eligible(outcome: &AttemptOutcome) -> bool {
    match outcome {
        AttemptOutcome::Failure(failure) => matches!(
            failure.kind,
            TransportFailureKind::Timeout | TransportFailureKind::Connection
        ),
        AttemptOutcome::Response(response) => match response.status {
            429 | 503 => true,
            502..=504 => true,
            400..=499 => false,
            500.. => true,
            _ => false,
        },
    }
}

/// `min(base_delay_ms * 2^retry_index, max_delay_ms)`, without jitter.
pub fn backoff_delay(retry_index: u32, config: &RetryConfig) -> Duration {
    let multiplier = 1u64 << retry_index.min(32);
    let delay_ms = config
        .base_delay_ms
        .saturating_mul(multiplier)
        .min(config.max_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Decides whether to retry after `attempt`.
///
/// `attempts_so_far` includes `attempt` itself. A `Retry-After` header in
/// seconds replaces the backoff; otherwise uniform jitter in
/// `[0, jitter_ms]` is added to [`backoff_delay`].
pub fn decide<R: Rng>(
    attempt: &Attempt,
    attempts_so_far: u32,
    config: &RetryConfig,
    rng: &mut R,
) -> RetryDecision {
    if attempts_so_far >= config.max_attempts() {
        return RetryDecision::Stop;
    }
    if !is_retry_eligible(&attempt.outcome) {
        return RetryDecision::Stop;
    }

    if let AttemptOutcome::Response(response) = &attempt.outcome {
        if let Some(after) = parse_retry_after(&response.headers) {
            return RetryDecision::Retry { after };
        }
    }

    let jitter_ms = if config.jitter_ms == 0 {
        0
    } else {
        rng.gen_range(0..=config.jitter_ms)
    };
    RetryDecision::Retry {
        after: backoff_delay(attempt.index, config) + Duration::from_millis(jitter_ms),
    }
}
