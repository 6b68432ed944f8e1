//! Error types for the dial module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while normalizing an authority or dialing it.
#[derive(Debug, Error)]
pub enum DialError {
    /// The authority string could not be split into a host and a port.
    #[error("invalid authority {authority:?}: {reason}")]
    InvalidAuthority {
        /// The authority as given by the caller.
        authority: String,
        /// Why the authority was rejected.
        reason: &'static str,
    },

    /// No connection was established before the dial timeout expired.
    #[error("dial {authority} timed out after {timeout:?}")]
    Timeout {
        /// The normalized authority being dialed.
        authority: String,
        /// The dial timeout that expired.
        timeout: Duration,
    },

    /// Name resolution failed, or every resolved address refused the connection.
    #[error("{authority} is unreachable: {source}")]
    Unreachable {
        /// The normalized authority being dialed.
        authority: String,
        /// The last error observed.
        #[source]
        source: std::io::Error,
    },
}

impl DialError {
    /// Creates an invalid authority error.
    pub fn invalid_authority(authority: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidAuthority {
            authority: authority.into(),
            reason,
        }
    }

    /// Creates a dial timeout error.
    pub fn timeout(authority: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            authority: authority.into(),
            timeout,
        }
    }

    /// Creates an unreachable error from the last I/O failure.
    pub fn unreachable(authority: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unreachable {
            authority: authority.into(),
            source,
        }
    }

    /// Returns true for the timeout variant, so callers can decide on a higher-level retry.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
