//! Retry decisions for requests that come back empty.
//!
//! Pooled keep-alive connections are routinely closed by servers between
//! requests. The next request on such a connection sees the peer hang up
//! before any response bytes arrive. That single condition, and nothing else,
//! is retried, up to `max_idempotent_call_attempts` total attempts.
//!
//! # Example
//!
//! ```
//! use hardened_fetch::fetch::{RetryDecision, RetryPolicy, RetryScope};
//! use reqwest::Method;
//!
//! let policy = RetryPolicy::new(5, RetryScope::IdempotentOnly);
//! assert!(matches!(policy.should_retry(&Method::GET, 1), RetryDecision::Retry { attempt: 2 }));
//! assert!(matches!(policy.should_retry(&Method::POST, 1), RetryDecision::DoNotRetry { .. }));
//! ```

use reqwest::Method;
use tracing::{debug, instrument};

use super::config::{ClientConfig, RetryScope};

/// Result of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send again; `attempt` is the 1-indexed number of the next attempt.
    Retry { attempt: u32 },
    DoNotRetry { reason: String },
}

/// Empty-response retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    scope: RetryScope,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` total attempts (clamped to at least 1).
    #[must_use]
    pub fn new(max_attempts: u32, scope: RetryScope) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            scope,
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_idempotent_call_attempts(), config.retry_scope())
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether an empty response on attempt `attempts_made` is retried.
    #[must_use]
    #[instrument(level = "debug", skip(self))]
    pub fn should_retry(&self, method: &Method, attempts_made: u32) -> RetryDecision {
        if self.scope == RetryScope::IdempotentOnly && !method.is_idempotent() {
            debug!("method is not idempotent");
            return RetryDecision::DoNotRetry {
                reason: format!("{method} is not idempotent"),
            };
        }
        if attempts_made >= self.max_attempts {
            debug!(max = self.max_attempts, "attempts exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }
        RetryDecision::Retry {
            attempt: attempts_made + 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_five_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        for made in 1..5 {
            assert_eq!(
                policy.should_retry(&Method::GET, made),
                RetryDecision::Retry { attempt: made + 1 }
            );
        }
        assert!(matches!(
            policy.should_retry(&Method::GET, 5),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_idempotent_methods_are_retried() {
        let policy = RetryPolicy::new(3, RetryScope::IdempotentOnly);
        for method in [Method::GET, Method::HEAD, Method::PUT, Method::DELETE, Method::OPTIONS] {
            assert!(
                matches!(policy.should_retry(&method, 1), RetryDecision::Retry { .. }),
                "{method}"
            );
        }
    }

    #[test]
    fn test_post_is_not_retried_by_default() {
        let policy = RetryPolicy::new(3, RetryScope::IdempotentOnly);
        match policy.should_retry(&Method::POST, 1) {
            RetryDecision::DoNotRetry { reason } => {
                assert!(reason.contains("POST"), "Expected method in: {reason}");
            }
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
    }

    #[test]
    fn test_any_method_scope_retries_post() {
        let policy = RetryPolicy::new(3, RetryScope::AnyMethod);
        assert_eq!(
            policy.should_retry(&Method::POST, 2),
            RetryDecision::Retry { attempt: 3 }
        );
        assert!(matches!(
            policy.should_retry(&Method::POST, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::new(0, RetryScope::AnyMethod);
        assert_eq!(policy.max_attempts(), 1);
        assert!(matches!(
            policy.should_retry(&Method::GET, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }
}
