//! HTTP client settings and retry logic.
//!
//! This module provides the HTTP client configuration and the retry policy
//! applied to every CloudAPI request.

use crate::Error;
use std::time::Duration;

/// Default timeout for CloudAPI requests, in milliseconds
pub const CLOUDAPI_DEFAULT_TIMEOUT_MS: u64 = 20_000;

// Connection pool settings

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

// Retry settings

/// Default maximum number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial retry delay in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default maximum retry delay in milliseconds (for exponential backoff)
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5000;

/// Retry policy with exponential backoff.
///
/// Only transport failures are ever retried, and never the classes listed in
/// [`TransportFailure::is_retriable`](crate::error::TransportFailure::is_retriable).
/// Server responses, whatever their status, are final. When
/// `idempotent_only` is set, requests with non-idempotent methods (POST,
/// PATCH) are sent exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,

    /// Backoff multiplier (typically 2 for exponential backoff)
    pub backoff_multiplier: u32,

    /// Only retry requests whose method is idempotent
    pub idempotent_only: bool,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: 2,
            idempotent_only: true,
        }
    }

    /// Create a retry policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1,
            idempotent_only: true,
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Allow or forbid retrying non-idempotent requests.
    #[must_use]
    pub const fn with_idempotent_only(mut self, idempotent_only: bool) -> Self {
        self.idempotent_only = idempotent_only;
        self
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = min(initial_delay * multiplier^(attempt - 1), max_delay)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let multiplier = self.backoff_multiplier.saturating_pow(attempt - 1);
        let delay = self.initial_delay.saturating_mul(multiplier);

        std::cmp::min(delay, self.max_delay)
    }

    /// Decide whether a failed request should be sent again.
    ///
    /// `attempt` is the 1-based number of the retry being considered.
    #[must_use]
    pub const fn should_retry(&self, error: &Error, idempotent: bool, attempt: u32) -> bool {
        attempt <= self.max_retries
            && error.is_retriable()
            && (idempotent || !self.idempotent_only)
    }

    /// Check if retries are enabled.
    #[must_use]
    pub const fn has_retries(&self) -> bool {
        self.max_retries > 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
///
/// Configures HTTP client behavior including timeouts, retries, and connection pooling.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Retry policy
    pub retry_policy: RetryPolicy,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Enable request/response logging
    pub enable_logging: bool,

    /// Enable response compression
    pub enable_compression: bool,

    /// Accept invalid TLS certificates
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_millis(CLOUDAPI_DEFAULT_TIMEOUT_MS),
            retry_policy: RetryPolicy::new(),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            enable_logging: true,
            enable_compression: true,
            accept_invalid_certs: false,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disable retries.
    #[must_use]
    pub const fn without_retries(mut self) -> Self {
        self.retry_policy = RetryPolicy::no_retry();
        self
    }

    /// Set connection pool idle timeout.
    #[must_use]
    pub const fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    #[must_use]
    pub const fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Enable or disable logging.
    #[must_use]
    pub const fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Enable or disable compression.
    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    /// Accept or reject invalid TLS certificates.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFailure;

    #[test]
    fn test_retry_policy_new() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(
            policy.initial_delay,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS)
        );
        assert_eq!(
            policy.max_delay,
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS)
        );
        assert_eq!(policy.backoff_multiplier, 2);
        assert!(policy.idempotent_only);
    }

    #[test]
    fn test_retry_policy_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_retries, 0);
        assert!(!policy.has_retries());
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new()
            .with_max_retries(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(3)
            .with_idempotent_only(false);

        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.backoff_multiplier, 3);
        assert!(!policy.idempotent_only);
    }

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::new();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(0));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(4000));

        // Would be 8000ms but capped at max_delay
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_policy_zero_delay() {
        let policy = RetryPolicy::new().with_initial_delay(Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_should_retry_transport_failures() {
        let policy = RetryPolicy::new();
        let reset = Error::transport(TransportFailure::ConnectionReset, "reset");

        assert!(policy.should_retry(&reset, true, 1));
        assert!(policy.should_retry(&reset, true, 3));
        assert!(!policy.should_retry(&reset, true, 4));
    }

    #[test]
    fn test_should_not_retry_never_retry_list() {
        let policy = RetryPolicy::new();

        for failure in [
            TransportFailure::Interrupted,
            TransportFailure::UnknownHost,
            TransportFailure::ConnectionRefused,
            TransportFailure::TlsHandshake,
        ] {
            let err = Error::transport(failure, "nope");
            assert!(!policy.should_retry(&err, true, 1), "{failure:?}");
        }

        assert!(!policy.should_retry(&Error::protocol(503, "busy"), true, 1));
    }

    #[test]
    fn test_should_retry_respects_idempotency() {
        let reset = Error::transport(TransportFailure::ConnectionReset, "reset");

        assert!(!RetryPolicy::new().should_retry(&reset, false, 1));
        assert!(RetryPolicy::new()
            .with_idempotent_only(false)
            .should_retry(&reset, false, 1));
    }

    #[test]
    fn test_retry_policy_has_retries() {
        assert!(RetryPolicy::new().has_retries());
        assert!(!RetryPolicy::no_retry().has_retries());
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new();
        assert_eq!(
            config.timeout,
            Duration::from_millis(CLOUDAPI_DEFAULT_TIMEOUT_MS)
        );
        assert_eq!(config.retry_policy.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.enable_logging);
        assert!(config.enable_compression);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_retry_policy(RetryPolicy::no_retry())
            .with_pool_idle_timeout(Duration::from_secs(120))
            .with_pool_max_idle(20)
            .with_logging(false)
            .with_compression(false)
            .with_accept_invalid_certs(true);

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry_policy.max_retries, 0);
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.pool_max_idle_per_host, 20);
        assert!(!config.enable_logging);
        assert!(!config.enable_compression);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_client_config_without_retries() {
        let config = ClientConfig::new().without_retries();
        assert_eq!(config.retry_policy.max_retries, 0);
    }

    #[test]
    fn test_retry_policy_exponential_backoff() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2)
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(3200));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5000));
    }
}
