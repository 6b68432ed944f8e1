//! CLI argument definitions using clap derive macros.

use std::time::Duration;

use clap::Parser;

use hardened_fetch::fetch::{
    ClientConfig, DEFAULT_MAX_CONNS_PER_HOST, DEFAULT_MAX_REDIRECTS, RetryScope, TlsVerification,
};

/// Fetch a page the way a browser would, through hostile networks.
///
/// Follows redirects, retries connections that close before answering and
/// decodes gzip/deflate bodies. The decoded body is written to stdout.
#[derive(Parser, Debug)]
#[command(name = "hfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URL to fetch (http or https)
    pub url: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum redirects to follow (1 returns the first response as-is)
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_REDIRECTS)]
    pub max_redirects: usize,

    /// Connect timeout in seconds (1-300)
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub dial_timeout_secs: u64,

    /// Per-request read timeout in seconds (1-300)
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub read_timeout_secs: u64,

    /// Maximum concurrent connections to one host
    #[arg(long, default_value_t = DEFAULT_MAX_CONNS_PER_HOST, value_parser = parse_positive)]
    pub max_conns_per_host: usize,

    /// Verify TLS certificates (disabled by default)
    #[arg(long)]
    pub verify_tls: bool,

    /// Retry empty responses for non-idempotent methods too
    #[arg(long)]
    pub retry_any_method: bool,

    /// Print the status line and response headers before the body
    #[arg(short = 'i', long)]
    pub include_headers: bool,
}

impl Args {
    /// Client configuration derived from the flags.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let tls = if self.verify_tls {
            TlsVerification::Enabled
        } else {
            TlsVerification::Disabled
        };
        let scope = if self.retry_any_method {
            RetryScope::AnyMethod
        } else {
            RetryScope::IdempotentOnly
        };
        ClientConfig::default()
            .with_dial_timeout(Duration::from_secs(self.dial_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.read_timeout_secs))
            .with_max_conns_per_host(self.max_conns_per_host)
            .with_tls_verification(tls)
            .with_retry_scope(scope)
    }
}

fn parse_positive(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
