//! One request/response exchange over the pooled HTTP client.
//!
//! [`Transport`] is the seam between the engine's redirect/retry logic and the
//! network. [`ReqwestTransport`] is the production implementation: a single
//! pooled `reqwest::Client` configured from [`ClientConfig`], with redirects
//! and decompression turned off so the engine sees every hop and every raw
//! body.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, instrument, warn};
use url::Url;

use super::config::{ClientConfig, TlsVerification};
use super::error::TransportError;
use super::request::FetchRequest;
use super::response::FetchResponse;
use crate::dial::{Authority, DialError, DualStackResolver};

/// Sends one request and returns the complete response, body included.
///
/// Implementations must not follow redirects or decode bodies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single exchange for `request` as it currently stands.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no complete response was received.
    async fn round_trip(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;
}

/// Production [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl ReqwestTransport {
    /// Builds the pooled client from `config`.
    ///
    /// # Errors
    ///
    /// Returns the client builder error (TLS backend initialization).
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, reqwest::Error> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method(), url = %request.url()))]
    async fn round_trip(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let url = request.url();
        let mut builder = self
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone())
            .timeout(self.config.read_timeout());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(url, e, Phase::Head, &self.config))?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = status.as_u16(), "response head received");

        let body = read_body(url, response, &self.config).await?;
        Ok(FetchResponse::new(status, headers, body))
    }
}

fn build_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.dial_timeout())
        .redirect(Policy::none())
        .no_proxy()
        .http1_only()
        .http1_title_case_headers()
        .pool_max_idle_per_host(config.max_conns_per_host())
        .pool_idle_timeout(config.max_idle_conn_duration())
        .dns_resolver(Arc::new(DualStackResolver));
    if config.tls_verification() == TlsVerification::Disabled {
        warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build()
}

/// Reads the whole body, refusing to buffer more than `max_body_size` bytes.
async fn read_body(
    url: &Url,
    response: reqwest::Response,
    config: &ClientConfig,
) -> Result<Bytes, TransportError> {
    let limit = config.max_body_size();
    let advertised = response
        .content_length()
        .and_then(|len| usize::try_from(len).ok());
    if advertised.is_some_and(|len| len > limit) {
        return Err(TransportError::body_too_large(url.as_str(), limit));
    }

    let capacity = advertised.unwrap_or(config.read_buffer_size()).min(limit);
    let mut body = BytesMut::with_capacity(capacity);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify_error(url, e, Phase::Body, config))?;
        if body.len() + chunk.len() > limit {
            return Err(TransportError::body_too_large(url.as_str(), limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Where in the exchange an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before the status line and headers were received.
    Head,
    /// While streaming the body.
    Body,
}

fn classify_error(
    url: &Url,
    error: reqwest::Error,
    phase: Phase,
    config: &ClientConfig,
) -> TransportError {
    if error.is_connect() {
        let authority = Authority::from_url(url)
            .map_or_else(|_| url.as_str().to_string(), |a| a.to_string());
        let kind = io_kind(&error);
        if error.is_timeout() || kind == Some(io::ErrorKind::TimedOut) {
            return DialError::timeout(authority, config.dial_timeout()).into();
        }
        let source = io::Error::new(kind.unwrap_or(io::ErrorKind::Other), error);
        return DialError::unreachable(authority, source).into();
    }
    if error.is_timeout() {
        return TransportError::timeout(url.as_str(), config.read_timeout());
    }
    // A truncated body is not retried: part of the response already arrived.
    if phase == Phase::Head && indicates_empty_response(&error) {
        return TransportError::empty_response(url.as_str());
    }
    TransportError::network(url.as_str(), error)
}

/// Walks the source chain looking for the peer hanging up before a complete
/// response head.
fn indicates_empty_response(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(hyper_err) = err.downcast_ref::<hyper::Error>()
            && hyper_err.is_incomplete_message()
        {
            return true;
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        {
            return true;
        }
        current = err.source();
    }
    false
}

fn io_kind(error: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Wrapper(io::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_hangups_in_source_chain_count_as_empty_response() {
        for kind in [
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
        ] {
            let err = Wrapper(io::Error::from(kind));
            assert!(indicates_empty_response(&err), "{kind:?}");
        }
    }

    #[test]
    fn test_other_io_errors_are_not_empty_response() {
        let err = Wrapper(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!indicates_empty_response(&err));
        assert_eq!(io_kind(&err), Some(io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_client_builds_with_both_tls_modes() {
        for verification in [TlsVerification::Disabled, TlsVerification::Enabled] {
            let config = ClientConfig::default().with_tls_verification(verification);
            assert!(ReqwestTransport::new(Arc::new(config)).is_ok());
        }
    }
}
