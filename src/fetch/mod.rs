//! Request execution: configuration, header profile, retry, per-host
//! ceiling and redirect following.
//!
//! # Overview
//!
//! - [`ClientConfig`] holds the immutable client settings
//! - [`FetchRequest`] carries the browser header profile across hops
//! - [`FetchEngine`] sends requests and follows redirects
//! - [`Transport`] is the network seam; [`ReqwestTransport`] is the pooled
//!   production implementation
//!
//! # Example
//!
//! ```no_run
//! use hardened_fetch::fetch::{ClientConfig, FetchEngine, FetchRequest, FetchResponse};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FetchEngine::new(ClientConfig::default())?;
//! let mut request = FetchRequest::get(Url::parse("http://example.com/")?);
//! let mut response = FetchResponse::default();
//! let mut log_hop = |r: &FetchResponse| println!("{}", r.status());
//! engine
//!     .fetch_follow_redirects(&mut request, &mut response, 10, Some(&mut log_hop))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod limiter;
mod request;
mod response;
mod retry;
mod transport;

pub use config::{
    ClientConfig, ConfigError, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_CONNS_PER_HOST,
    DEFAULT_MAX_IDEMPOTENT_CALL_ATTEMPTS, DEFAULT_MAX_IDLE_CONN_DURATION, DEFAULT_READ_BUFFER_SIZE,
    DEFAULT_READ_TIMEOUT, RetryScope, TlsVerification,
};
pub use engine::{DEFAULT_MAX_REDIRECTS, FetchEngine, FetchedPage, ResponseObserver};
pub use error::{BuildError, FetchError, TransportError};
pub use limiter::{HostLimiter, HostPermit};
pub use request::{BROWSER_HEADERS, BROWSER_USER_AGENT, FetchRequest, apply_browser_profile};
pub use response::{FetchResponse, is_redirect_status};
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{ReqwestTransport, Transport};
