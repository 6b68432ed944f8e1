//! Dual-stack resolution and connection racing.
//!
//! Addresses are resolved for both families and interleaved so that a host
//! advertising a broken family never starves the working one. Connection
//! attempts are then raced: a new attempt starts whenever the previous one
//! fails or [`CONNECTION_ATTEMPT_DELAY`] passes without an answer.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::net::TcpStream;
use tracing::{debug, instrument, trace};

use super::{Authority, DialError};

/// Delay before the next address is tried while an attempt is still pending.
pub const CONNECTION_ATTEMPT_DELAY: Duration = Duration::from_millis(250);

/// Normalizes `authority` and connects to it over whichever address family
/// answers first within `timeout`.
///
/// # Errors
///
/// - [`DialError::InvalidAuthority`] if the authority cannot be normalized
/// - [`DialError::Timeout`] if no connection is established in time
/// - [`DialError::Unreachable`] if resolution fails or every address refuses
#[instrument(skip(timeout), fields(timeout_ms = timeout.as_millis()))]
pub async fn resolve_and_dial(authority: &str, timeout: Duration) -> Result<TcpStream, DialError> {
    let authority = Authority::parse(authority)?;
    dial_authority(&authority, timeout).await
}

/// Connects to an already normalized authority.
///
/// # Errors
///
/// Same as [`resolve_and_dial`], minus authority validation.
pub async fn dial_authority(
    authority: &Authority,
    timeout: Duration,
) -> Result<TcpStream, DialError> {
    let attempt = async {
        let addrs = resolve_dual_stack(authority.host(), authority.port()).await?;
        race_connect(addrs, CONNECTION_ATTEMPT_DELAY, |addr| TcpStream::connect(addr)).await
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok((addr, stream))) => {
            debug!(%authority, %addr, "connected");
            Ok(stream)
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
            Err(DialError::timeout(authority.to_string(), timeout))
        }
        Ok(Err(e)) => Err(DialError::unreachable(authority.to_string(), e)),
        Err(_) => Err(DialError::timeout(authority.to_string(), timeout)),
    }
}

/// Resolves `host` for both address families, interleaving the results.
///
/// # Errors
///
/// Returns the resolver's I/O error, or `NotFound` when it yields nothing.
pub async fn resolve_dual_stack(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        ));
    }
    trace!(host, count = addrs.len(), "resolved");
    Ok(interleave_families(addrs))
}

/// Orders addresses by alternating family, starting with the family of the
/// first address. Relative order within a family is preserved.
#[must_use]
pub fn interleave_families(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let Some(first) = addrs.first() else {
        return addrs;
    };
    let leading_v6 = first.is_ipv6();
    let (preferred, fallback): (Vec<_>, Vec<_>) =
        addrs.into_iter().partition(|a| a.is_ipv6() == leading_v6);

    let mut ordered = Vec::with_capacity(preferred.len() + fallback.len());
    let mut preferred = preferred.into_iter();
    let mut fallback = fallback.into_iter();
    loop {
        match (preferred.next(), fallback.next()) {
            (None, None) => break,
            (a, b) => ordered.extend(a.into_iter().chain(b)),
        }
    }
    ordered
}

/// Races `connect` over `addrs` and returns the first success.
///
/// Attempts are started in order; the next one begins when an in-flight
/// attempt fails or `attempt_delay` elapses. Losing attempts are dropped.
pub(crate) async fn race_connect<T, F, Fut>(
    addrs: Vec<SocketAddr>,
    attempt_delay: Duration,
    connect: F,
) -> io::Result<(SocketAddr, T)>
where
    F: Fn(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut remaining = addrs.into_iter();
    let mut in_flight = FuturesUnordered::new();
    let mut last_error: Option<io::Error> = None;

    let start = |addr: SocketAddr| {
        let attempt = connect(addr);
        async move { (addr, attempt.await) }
    };

    if let Some(addr) = remaining.next() {
        in_flight.push(start(addr));
    }

    while !in_flight.is_empty() {
        tokio::select! {
            Some((addr, result)) = in_flight.next() => match result {
                Ok(conn) => return Ok((addr, conn)),
                Err(e) => {
                    trace!(%addr, error = %e, "connection attempt failed");
                    last_error = Some(e);
                    if let Some(next) = remaining.next() {
                        in_flight.push(start(next));
                    }
                }
            },
            () = tokio::time::sleep(attempt_delay), if remaining.len() > 0 => {
                if let Some(next) = remaining.next() {
                    trace!(addr = %next, "starting staggered attempt");
                    in_flight.push(start(next));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to")
    }))
}
