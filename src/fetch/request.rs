//! Outbound request state and the fixed browser header profile.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::error::FetchError;

/// User-Agent sent with every request.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:106.0) Gecko/20100101 Firefox/106.0";

/// The header profile applied to every request, in wire order.
///
/// Names are lowercase here; the transport writes them title-cased.
pub const BROWSER_HEADERS: [(&str, &str); 12] = [
    ("user-agent", BROWSER_USER_AGENT),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.5"),
    ("accept-encoding", "gzip, deflate"),
    ("connection", "close"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "cross-site"),
    ("pragma", "no-cache"),
    ("cache-control", "no-cache"),
    ("te", "trailers"),
];

/// Overwrites `headers` with the browser profile.
pub fn apply_browser_profile(headers: &mut HeaderMap) {
    for (name, value) in BROWSER_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// A request reused across every hop of one fetch.
///
/// The header profile is applied once, at construction. Following a redirect
/// only rewrites the URL; method, headers and body are kept as they are.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl FetchRequest {
    /// Creates a request carrying the browser header profile.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::with_capacity(BROWSER_HEADERS.len());
        apply_browser_profile(&mut headers);
        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Creates a GET request carrying the browser header profile.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The current target; changes as redirects are followed.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Points the request at `location`, resolved against the current URL.
    ///
    /// Absolute, scheme-relative and path-relative targets are accepted. The
    /// URL is left untouched when the target does not parse or is not http(s).
    pub(crate) fn redirect_to(&mut self, location: &str) -> Result<(), FetchError> {
        let target = self
            .url
            .join(location)
            .map_err(|e| FetchError::invalid_redirect(self.url.as_str(), location, e.to_string()))?;
        if !is_http_scheme(&target) {
            return Err(FetchError::invalid_redirect(
                self.url.as_str(),
                location,
                format!("unsupported scheme `{}`", target.scheme()),
            ));
        }
        self.url = target;
        Ok(())
    }
}

pub(crate) fn is_http_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
