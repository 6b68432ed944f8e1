//! Client configuration shared by every fetch.
//!
//! A [`ClientConfig`] is built once, validated when the engine is constructed
//! and then shared read-only (`Arc`) by the engine, the transport and the
//! per-host limiter. Nothing mutates it afterwards.

use std::time::Duration;

use thiserror::Error;

use crate::decode::DEFAULT_MAX_DECODED_SIZE;

/// Default dial (connect) timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(7);

/// Default per-call read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(7);

/// Default ceiling on connections to one host.
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 233;

/// Default lifetime of an idle pooled connection (15 minutes).
pub const DEFAULT_MAX_IDLE_CONN_DURATION: Duration = Duration::from_secs(15 * 60);

/// Default read buffer size (8 KiB), sized for typical HTML/XML pages.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default number of attempts (including the first) for requests that come
/// back empty.
pub const DEFAULT_MAX_IDEMPOTENT_CALL_ATTEMPTS: u32 = 5;

/// Whether the TLS peer certificate and host name are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVerification {
    /// Accept any certificate.
    ///
    /// This is the default: the client targets hosts with expired, self-signed
    /// or mismatched certificates and trades server authentication for reach.
    /// Do not send credentials through a client configured this way.
    #[default]
    Disabled,
    /// Verify the certificate chain and host name against the bundled roots.
    Enabled,
}

/// Which requests the empty-response retry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryScope {
    /// Only idempotent methods (GET, HEAD, PUT, DELETE, OPTIONS, TRACE).
    #[default]
    IdempotentOnly,
    /// Every method, including POST and PATCH.
    AnyMethod,
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Expected range or constraint.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

/// Immutable configuration for a [`FetchEngine`](super::FetchEngine).
///
/// # Default Values
///
/// - `dial_timeout`: 7 seconds
/// - `read_timeout`: 7 seconds
/// - `max_conns_per_host`: 233
/// - `max_idle_conn_duration`: 15 minutes
/// - `read_buffer_size`: 8 KiB
/// - `max_idempotent_call_attempts`: 5
/// - `tls_verification`: disabled
/// - `retry_scope`: idempotent methods only
/// - `max_body_size`: 64 MiB
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hardened_fetch::fetch::{ClientConfig, TlsVerification};
///
/// let config = ClientConfig::default()
///     .with_dial_timeout(Duration::from_secs(3))
///     .with_tls_verification(TlsVerification::Enabled);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    dial_timeout: Duration,
    read_timeout: Duration,
    max_conns_per_host: usize,
    max_idle_conn_duration: Duration,
    read_buffer_size: usize,
    max_idempotent_call_attempts: u32,
    tls_verification: TlsVerification,
    retry_scope: RetryScope,
    max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
            max_idle_conn_duration: DEFAULT_MAX_IDLE_CONN_DURATION,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_idempotent_call_attempts: DEFAULT_MAX_IDEMPOTENT_CALL_ATTEMPTS,
            tls_verification: TlsVerification::default(),
            retry_scope: RetryScope::default(),
            max_body_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_conns_per_host(mut self, max: usize) -> Self {
        self.max_conns_per_host = max;
        self
    }

    #[must_use]
    pub fn with_max_idle_conn_duration(mut self, duration: Duration) -> Self {
        self.max_idle_conn_duration = duration;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the total number of attempts for a request that comes back empty.
    #[must_use]
    pub fn with_max_idempotent_call_attempts(mut self, attempts: u32) -> Self {
        self.max_idempotent_call_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_tls_verification(mut self, verification: TlsVerification) -> Self {
        self.tls_verification = verification;
        self
    }

    #[must_use]
    pub fn with_retry_scope(mut self, scope: RetryScope) -> Self {
        self.retry_scope = scope;
        self
    }

    /// Sets the ceiling for both the raw and the decoded body.
    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[must_use]
    pub fn max_conns_per_host(&self) -> usize {
        self.max_conns_per_host
    }

    #[must_use]
    pub fn max_idle_conn_duration(&self) -> Duration {
        self.max_idle_conn_duration
    }

    #[must_use]
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    #[must_use]
    pub fn max_idempotent_call_attempts(&self) -> u32 {
        self.max_idempotent_call_attempts
    }

    #[must_use]
    pub fn tls_verification(&self) -> TlsVerification {
        self.tls_verification
    }

    #[must_use]
    pub fn retry_scope(&self) -> RetryScope {
        self.retry_scope
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dial_timeout.is_zero() {
            return Err(ConfigError::invalid("dial_timeout", "must be greater than zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::invalid("read_timeout", "must be greater than zero"));
        }
        if self.max_conns_per_host == 0 {
            return Err(ConfigError::invalid(
                "max_conns_per_host",
                "must be at least 1",
            ));
        }
        // Semaphore permits are capped well below usize::MAX.
        if self.max_conns_per_host > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_conns_per_host",
                "exceeds the maximum number of semaphore permits",
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::invalid("read_buffer_size", "must be at least 1"));
        }
        if self.max_idempotent_call_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_idempotent_call_attempts",
                "must be at least 1 (the initial attempt)",
            ));
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::invalid("max_body_size", "must be at least 1"));
        }
        Ok(())
    }
}
