//! Authority normalization and dual-stack dialing.
//!
//! Servers and DNS often advertise both address families inconsistently, and
//! authorities arrive in several shapes (`example.com`, `example.com:`,
//! `[::1]:8080`). This module centralizes both concerns:
//!
//! - [`Authority`] turns a `host[:port]` string into a host and numeric port
//! - [`resolve_and_dial`] connects over whichever family answers first
//! - [`DualStackResolver`] applies the same resolution policy inside the
//!   pooled HTTP client
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hardened_fetch::dial::resolve_and_dial;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = resolve_and_dial("example.com", Duration::from_secs(7)).await?;
//! println!("connected to {}", stream.peer_addr()?);
//! # Ok(())
//! # }
//! ```

mod authority;
mod connect;
mod error;
mod resolver;

pub use authority::{Authority, DEFAULT_PORT};
pub use connect::{
    CONNECTION_ATTEMPT_DELAY, dial_authority, interleave_families, resolve_and_dial,
    resolve_dual_stack,
};
pub use error::DialError;
pub use resolver::DualStackResolver;
