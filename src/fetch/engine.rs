//! The redirect-following fetch engine.
//!
//! Each hop goes through the same small state machine:
//!
//! ```text
//! Sending ──ok──▶ GotResponse ──not a redirect / single-shot──▶ Done
//!    │                 │
//!    │                 ├──count > max──▶ Failed(TooManyRedirects)
//!    │                 ├──no Location──▶ Failed(MissingLocation)
//!    │                 └──▶ Redirecting ──rewrite URL, reset response──▶ Sending
//!    └──err──▶ Failed(..)
//! ```
//!
//! Empty responses are retried inside the send step and never reach the
//! redirect loop.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::config::ClientConfig;
use super::error::{BuildError, FetchError, TransportError};
use super::limiter::HostLimiter;
use super::request::{FetchRequest, is_http_scheme};
use super::response::FetchResponse;
use super::retry::{RetryDecision, RetryPolicy};
use super::transport::{ReqwestTransport, Transport};
use crate::decode::decode_body_with_limit;
use crate::dial::Authority;

/// Default redirect bound used by [`FetchEngine::fetch`] callers that have no
/// opinion.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Callback invoked with every response received, in hop order.
pub type ResponseObserver<'a> = &'a mut (dyn FnMut(&FetchResponse) + Send);

/// Result of [`FetchEngine::fetch`].
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL of the final hop.
    pub url: Url,
    /// The final response; its body is still the raw, encoded body.
    pub response: FetchResponse,
    /// The final body decoded per its `Content-Encoding`.
    pub body: Bytes,
    /// Number of redirects followed.
    pub redirects: usize,
}

#[derive(Debug)]
enum HopState {
    Sending,
    GotResponse,
    Redirecting(String),
    Done,
    Failed(FetchError),
}

/// Executes requests with retry, a per-host ceiling and redirect following.
///
/// Cheap to clone; clones share the pooled client, configuration and limiter.
///
/// # Example
///
/// ```no_run
/// use hardened_fetch::fetch::{ClientConfig, FetchEngine, DEFAULT_MAX_REDIRECTS};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = FetchEngine::new(ClientConfig::default())?;
/// let page = engine.fetch("http://example.com/", DEFAULT_MAX_REDIRECTS).await?;
/// println!("{} -> {} bytes", page.url, page.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FetchEngine {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    limiter: Arc<HostLimiter>,
    retry: RetryPolicy,
}

impl fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEngine")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FetchEngine {
    /// Validates `config` and builds the pooled transport from it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] for invalid values and
    /// [`BuildError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let config = Arc::new(config);
        let transport = ReqwestTransport::new(Arc::clone(&config))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds an engine around a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] for invalid values.
    pub fn with_transport(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        let limiter = Arc::new(HostLimiter::new(config.max_conns_per_host()));
        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            config,
            transport,
            limiter,
            retry,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn limiter(&self) -> &HostLimiter {
        &self.limiter
    }

    /// Sends `request`, following up to `max_redirects` redirects.
    ///
    /// On return `response` holds the last response received and `request`
    /// points at the URL that produced it. With `max_redirects == 1` the first
    /// response is returned as-is, redirect or not. `observer` sees every
    /// response, including intermediate redirects.
    ///
    /// # Errors
    ///
    /// - [`FetchError::TooManyRedirects`] if the chain is longer than `max_redirects`
    /// - [`FetchError::MissingLocation`] for a redirect without a target
    /// - [`FetchError::InvalidRedirect`] for a target that is not an http(s) URL
    /// - dial and transport errors from any hop
    pub async fn fetch_follow_redirects(
        &self,
        request: &mut FetchRequest,
        response: &mut FetchResponse,
        max_redirects: usize,
        observer: Option<ResponseObserver<'_>>,
    ) -> Result<(), FetchError> {
        self.follow(request, response, max_redirects, observer)
            .await
            .map(|_| ())
    }

    /// GETs `url` with the browser header profile, follows redirects and
    /// decodes the final body.
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidUrl`] for unparseable or non-http(s) URLs, any
    /// error from [`fetch_follow_redirects`](Self::fetch_follow_redirects),
    /// and [`FetchError::UnsupportedEncoding`] / [`FetchError::Decode`] for the
    /// final body. The decode errors carry the final response, see
    /// [`FetchError::response`].
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str, max_redirects: usize) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::invalid_url(url, e.to_string()))?;
        if !is_http_scheme(&parsed) {
            return Err(FetchError::invalid_url(
                url,
                format!("unsupported scheme `{}`", parsed.scheme()),
            ));
        }

        let mut request = FetchRequest::get(parsed);
        let mut response = FetchResponse::default();
        let redirects = self
            .follow(&mut request, &mut response, max_redirects, None)
            .await?;
        let body = match decode_body_with_limit(&response, self.config.max_body_size()) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    url = %request.url(),
                    status = response.status().as_u16(),
                    error = %e,
                    "response body could not be decoded"
                );
                return Err(FetchError::body_decode(e, response));
            }
        };
        info!(
            url = %request.url(),
            status = response.status().as_u16(),
            redirects,
            bytes = body.len(),
            "fetch complete"
        );
        Ok(FetchedPage {
            url: request.url().clone(),
            response,
            body,
            redirects,
        })
    }

    /// The redirect loop; returns the number of redirects followed.
    #[instrument(level = "debug", skip_all, fields(url = %request.url(), max_redirects = max_redirects))]
    async fn follow(
        &self,
        request: &mut FetchRequest,
        response: &mut FetchResponse,
        max_redirects: usize,
        mut observer: Option<ResponseObserver<'_>>,
    ) -> Result<usize, FetchError> {
        let mut redirects = 0usize;
        let mut state = HopState::Sending;
        loop {
            state = match state {
                HopState::Sending => match self.send(request).await {
                    Ok(received) => {
                        *response = received;
                        if let Some(observe) = observer.as_deref_mut() {
                            observe(&*response);
                        }
                        HopState::GotResponse
                    }
                    Err(e) => HopState::Failed(e.into()),
                },
                HopState::GotResponse => {
                    next_after_response(request.url(), response, max_redirects, &mut redirects)
                }
                HopState::Redirecting(location) => match request.redirect_to(&location) {
                    Ok(()) => {
                        debug!(hop = redirects, target = %request.url(), "following redirect");
                        response.reset();
                        HopState::Sending
                    }
                    Err(e) => HopState::Failed(e),
                },
                HopState::Done => return Ok(redirects),
                HopState::Failed(e) => {
                    warn!(url = %request.url(), hop = redirects, error = %e, "fetch failed");
                    return Err(e);
                }
            };
        }
    }

    /// One hop: holds a host permit and retries empty responses.
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let authority = Authority::from_url(request.url())?;
        let _permit = self
            .limiter
            .acquire(&authority)
            .await
            .map_err(|_| TransportError::limiter_closed(authority.to_string()))?;

        let mut attempts = 1;
        loop {
            match self.transport.round_trip(request).await {
                Err(e) if e.is_empty_response() => {
                    match self.retry.should_retry(request.method(), attempts) {
                        RetryDecision::Retry { attempt } => {
                            debug!(url = %request.url(), attempt, "empty response, retrying");
                            attempts = attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %request.url(), %reason, "empty response, giving up");
                            return Err(e);
                        }
                    }
                }
                other => return other,
            }
        }
    }
}

fn next_after_response(
    url: &Url,
    response: &FetchResponse,
    max_redirects: usize,
    redirects: &mut usize,
) -> HopState {
    if max_redirects == 1 || !response.is_redirect() {
        return HopState::Done;
    }
    *redirects += 1;
    if *redirects > max_redirects {
        return HopState::Failed(FetchError::too_many_redirects(url.as_str(), max_redirects));
    }
    match response.location() {
        Some(location) => HopState::Redirecting(location.to_string()),
        None => HopState::Failed(FetchError::missing_location(
            url.as_str(),
            response.status().as_u16(),
        )),
    }
}
