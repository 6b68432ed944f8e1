//! Hardened HTTP page fetching.
//!
//! This library retrieves remote pages reliably from hosts that misbehave:
//! inconsistent address families, broken or chained redirects, content-encoded
//! bodies and connections that close before answering.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`dial`] - Authority normalization and dual-stack dialing
//! - [`fetch`] - Client configuration, retry, per-host ceiling and redirects
//! - [`decode`] - `Content-Encoding` aware body decoding
//! - [`dispatch`] - Exactly-once execution on a lossy UI event loop

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod decode;
pub mod dial;
pub mod dispatch;
pub mod fetch;

// Re-export commonly used types
pub use decode::{DecodeError, decode_body, decode_body_with_limit};
pub use dial::{Authority, DialError, resolve_and_dial};
pub use dispatch::{EventLoop, dispatch_once};
pub use fetch::{
    ClientConfig, DEFAULT_MAX_REDIRECTS, FetchEngine, FetchError, FetchRequest, FetchResponse,
    FetchedPage, TlsVerification, TransportError,
};
