//! Response state owned by the caller for one fetch.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION};

/// Status, headers and raw (possibly encoded) body of one hop.
///
/// The engine overwrites it on every hop and calls [`reset`](Self::reset)
/// before following a redirect, so after a fetch it always describes the last
/// response received. Decode the body with
/// [`decode_body`](crate::decode::decode_body).
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Raw body as received, before any content decoding.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// True for 301, 302, 303, 307 and 308.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        is_redirect_status(self.status)
    }

    /// The `Location` header, if present, non-empty and valid UTF-8.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Clears status, headers and body so the value can be reused for the next hop.
    pub fn reset(&mut self) {
        self.status = StatusCode::default();
        self.headers.clear();
        self.body = Bytes::new();
    }
}

/// Redirect-class status codes the engine follows.
#[must_use]
pub fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}
