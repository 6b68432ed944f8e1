//! Authority (`host[:port]`) normalization.
//!
//! Splitting follows the usual host/port rules: IPv6 literals must be
//! bracketed when a port is present, and a bare host is only accepted through
//! the missing-port recovery path, which appends the default port.

use std::fmt;
use std::str::FromStr;

use url::{Host, Url};

use super::DialError;

/// Port used when an authority carries none (or an empty one).
pub const DEFAULT_PORT: u16 = 80;

/// A normalized network authority: non-empty host and numeric port.
///
/// IPv6 literals are stored without brackets and rendered with them, so the
/// `Display` form is always dialable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    host: String,
    port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitError {
    MissingPort,
    MissingBracket,
    TooManyColons,
    UnexpectedOpenBracket,
    UnexpectedCloseBracket,
}

impl SplitError {
    fn reason(self) -> &'static str {
        match self {
            Self::MissingPort => "missing port in address",
            Self::MissingBracket => "missing ']' in address",
            Self::TooManyColons => "too many colons in address",
            Self::UnexpectedOpenBracket => "unexpected '[' in address",
            Self::UnexpectedCloseBracket => "unexpected ']' in address",
        }
    }
}

impl Authority {
    /// Normalizes `host`, `host:`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A missing or empty port becomes [`DEFAULT_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`DialError::InvalidAuthority`] when the string cannot be split,
    /// the host is empty, or the port is not a number in `1..=65535`.
    pub fn parse(input: &str) -> Result<Self, DialError> {
        let recovered;
        let (host, port) = match split_host_port(input) {
            Ok(parts) => parts,
            Err(SplitError::MissingPort) => {
                recovered = format!("{}:{DEFAULT_PORT}", input.trim_end_matches(':'));
                split_host_port(&recovered)
                    .map_err(|e| DialError::invalid_authority(input, e.reason()))?
            }
            Err(e) => return Err(DialError::invalid_authority(input, e.reason())),
        };

        if host.is_empty() {
            return Err(DialError::invalid_authority(input, "empty host"));
        }

        let port = match port {
            "" | ":" => DEFAULT_PORT,
            digits => match digits.parse::<u16>() {
                Ok(0) | Err(_) => return Err(DialError::invalid_authority(input, "invalid port")),
                Ok(port) => port,
            },
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Builds the authority a request to `url` will be sent to.
    ///
    /// The scheme's well-known port is used when the URL has none.
    ///
    /// # Errors
    ///
    /// Returns [`DialError::InvalidAuthority`] for URLs without a host.
    pub fn from_url(url: &Url) -> Result<Self, DialError> {
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(DialError::invalid_authority(url.as_str(), "URL has no host")),
        };
        Ok(Self {
            host,
            port: url.port_or_known_default().unwrap_or(DEFAULT_PORT),
        })
    }

    /// Host name or address literal, without brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Authority {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_host_port(input: &str) -> Result<(&str, &str), SplitError> {
    let Some(colon) = input.rfind(':') else {
        return Err(SplitError::MissingPort);
    };

    let (host, open_from, close_from) = if input.starts_with('[') {
        let Some(end) = input.find(']') else {
            return Err(SplitError::MissingBracket);
        };
        let after = end + 1;
        if after == input.len() {
            return Err(SplitError::MissingPort);
        }
        if after != colon {
            return Err(if input.as_bytes()[after] == b':' {
                SplitError::TooManyColons
            } else {
                SplitError::MissingPort
            });
        }
        (&input[1..end], 1, after)
    } else {
        let host = &input[..colon];
        if host.contains(':') {
            return Err(SplitError::TooManyColons);
        }
        (host, 0, 0)
    };

    if input[open_from..].contains('[') {
        return Err(SplitError::UnexpectedOpenBracket);
    }
    if input[close_from..].contains(']') {
        return Err(SplitError::UnexpectedCloseBracket);
    }

    Ok((host, &input[colon + 1..]))
}
