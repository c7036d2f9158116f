use crate::{Result, ScanApiError};

/// Bounds and pacing for automatic retries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy, factor 2).
    pub base_delay_ms: u64,
    /// Upper bound for the computed backoff, before jitter.
    pub max_delay_ms: u64,
    /// Upper bound for the uniform random jitter added to backoff.
    pub jitter_ms: u64,
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts a call may make, always at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_ms: 1_000,
        }
    }
}

/// Configures HTTP timeout, retry and logging behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds. Ignored on `wasm32`.
    pub connect_timeout_ms: u64,
    /// Socket read timeout in milliseconds. Ignored on `wasm32`.
    pub read_timeout_ms: u64,
    pub retry: RetryConfig,
    /// Emits log events when the `tracing` feature is enabled.
    pub logging: bool,
    /// Responses slower than this are reported as slow. Observation only.
    pub slow_response_ms: Option<u64>,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            retry: RetryConfig::default(),
            logging: true,
            slow_response_ms: Some(5_000),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl ClientOptions {
    /// Replaces the retry bounds.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the overall per-attempt timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Rejects zero timeouts and inverted delay bounds.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 || self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ScanApiError::Config(
                "timeouts must be greater than zero".to_owned(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ScanApiError::Config(format!(
                "max_delay_ms ({}) must not be below base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientOptions, RetryConfig};
    use crate::ScanApiError;

    #[test]
    fn defaults_match_documented_values() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.max_delay_ms, 60_000);
        assert_eq!(retry.jitter_ms, 1_000);
        assert_eq!(retry.max_attempts(), 4);

        let opts = ClientOptions::default();
        assert_eq!(opts.slow_response_ms, Some(5_000));
        assert!(opts.user_agent.starts_with("scanapi-http/"));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn disabled_retry_still_allows_one_attempt() {
        assert_eq!(RetryConfig::disabled().max_attempts(), 1);
    }

    #[test]
    fn validate_rejects_inverted_delays() {
        let opts = ClientOptions::default().with_retry(RetryConfig {
            base_delay_ms: 500,
            max_delay_ms: 100,
            ..RetryConfig::default()
        });
        assert!(matches!(opts.validate(), Err(ScanApiError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let opts = ClientOptions::default().with_timeout_ms(0);
        assert!(matches!(opts.validate(), Err(ScanApiError::Config(_))));
    }
}
