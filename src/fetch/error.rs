//! Error types for the fetch module.
//!
//! [`TransportError`] describes a single request/response exchange.
//! [`FetchError`] is what callers of the engine see: dial failures are lifted
//! into their own variants so callers can match on them without digging
//! through the transport layer.

use std::time::Duration;

use thiserror::Error;

use super::config::ConfigError;
use super::response::FetchResponse;
use crate::decode::DecodeError;
use crate::dial::DialError;

/// Errors from one request/response exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The response did not arrive within the per-call read timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// The URL requested.
        url: String,
        /// The read timeout that expired.
        timeout: Duration,
    },

    /// The peer closed the connection before sending a complete response.
    ///
    /// The only condition the engine retries on.
    #[error("empty response from {url}")]
    EmptyResponse {
        /// The URL requested.
        url: String,
    },

    /// The raw body grew past the configured ceiling.
    #[error("response body from {url} exceeds {limit} bytes")]
    BodyTooLarge {
        /// The URL requested.
        url: String,
        /// The ceiling in bytes.
        limit: usize,
    },

    /// The per-host connection limiter stopped handing out permits.
    #[error("connection limiter for {authority} is closed")]
    LimiterClosed {
        /// The `host:port` whose slot was requested.
        authority: String,
    },

    /// Any other HTTP-level failure (TLS, protocol, malformed response).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL requested.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates a read timeout error.
    pub fn timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            timeout,
        }
    }

    /// Creates an empty response error.
    pub fn empty_response(url: impl Into<String>) -> Self {
        Self::EmptyResponse { url: url.into() }
    }

    /// Creates a body ceiling error.
    pub fn body_too_large(url: impl Into<String>, limit: usize) -> Self {
        Self::BodyTooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates a closed-limiter error.
    pub fn limiter_closed(authority: impl Into<String>) -> Self {
        Self::LimiterClosed {
            authority: authority.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    #[must_use]
    pub fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse { .. })
    }

    /// True for dial and read timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Dial(dial) => dial.is_timeout(),
            _ => false,
        }
    }
}

/// Errors returned by [`FetchEngine`](super::FetchEngine).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL given by the caller does not parse or is not http(s).
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request URL has no usable host/port.
    #[error("invalid authority {authority:?}: {reason}")]
    InvalidAuthority {
        authority: String,
        reason: &'static str,
    },

    /// Connecting took longer than the dial timeout.
    #[error("dial {authority} timed out after {timeout:?}")]
    DialTimeout {
        authority: String,
        timeout: Duration,
    },

    /// Resolution failed or every address refused the connection.
    #[error("{authority} is unreachable: {source}")]
    DialUnreachable {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    /// The redirect chain is longer than the caller allowed.
    #[error("too many redirects (limit {max_redirects}) at {url}")]
    TooManyRedirects {
        /// The URL that answered with one redirect too many.
        url: String,
        max_redirects: usize,
    },

    /// A redirect status arrived without a `Location` header.
    #[error("redirect status {status} from {url} without Location header")]
    MissingLocation { url: String, status: u16 },

    /// The `Location` header does not resolve to an http(s) URL.
    #[error("invalid redirect target {location:?} from {url}: {reason}")]
    InvalidRedirect {
        url: String,
        location: String,
        reason: String,
    },

    /// The exchange failed after the connection was established.
    #[error(transparent)]
    Transport(TransportError),

    /// The final body uses a content encoding this client cannot decode.
    ///
    /// `response` still holds the status, headers and raw body.
    #[error("response content encoding {encoding:?} not supported")]
    UnsupportedEncoding {
        encoding: String,
        response: Box<FetchResponse>,
    },

    /// The final body could not be decoded.
    ///
    /// `response` still holds the status, headers and raw body.
    #[error("failed to decode response body")]
    Decode {
        #[source]
        source: DecodeError,
        response: Box<FetchResponse>,
    },
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a too-many-redirects error.
    pub fn too_many_redirects(url: impl Into<String>, max_redirects: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            max_redirects,
        }
    }

    /// Creates a missing-location error.
    pub fn missing_location(url: impl Into<String>, status: u16) -> Self {
        Self::MissingLocation {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid redirect error.
    pub fn invalid_redirect(
        url: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRedirect {
            url: url.into(),
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a body decode failure together with the response it came from.
    #[must_use]
    pub fn body_decode(error: DecodeError, response: FetchResponse) -> Self {
        let response = Box::new(response);
        match error {
            DecodeError::UnsupportedEncoding { encoding } => {
                Self::UnsupportedEncoding { encoding, response }
            }
            source => Self::Decode { source, response },
        }
    }

    /// The final response for errors raised after it was received.
    ///
    /// Only decode failures carry one; status and headers stay readable even
    /// though the body could not be decoded.
    #[must_use]
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            Self::UnsupportedEncoding { response, .. } | Self::Decode { response, .. } => {
                Some(response.as_ref())
            }
            _ => None,
        }
    }

    /// True for dial and read timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DialTimeout { .. } => true,
            Self::Transport(transport) => transport.is_timeout(),
            _ => false,
        }
    }
}

impl From<DialError> for FetchError {
    fn from(error: DialError) -> Self {
        match error {
            DialError::InvalidAuthority { authority, reason } => {
                Self::InvalidAuthority { authority, reason }
            }
            DialError::Timeout { authority, timeout } => Self::DialTimeout { authority, timeout },
            DialError::Unreachable { authority, source } => {
                Self::DialUnreachable { authority, source }
            }
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Dial(dial) => dial.into(),
            other => Self::Transport(other),
        }
    }
}

/// Errors constructing a [`FetchEngine`](super::FetchEngine).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
