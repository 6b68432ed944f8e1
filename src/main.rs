//! CLI entry point for hfetch.

use std::io::{self, Write};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use hardened_fetch::decode::decode_body_with_limit;
use hardened_fetch::fetch::{FetchEngine, FetchRequest, FetchResponse};
use tracing::{debug, info};
use url::Url;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the body
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let url = Url::parse(&args.url).with_context(|| format!("invalid URL: {}", args.url))?;
    ensure!(
        matches!(url.scheme(), "http" | "https"),
        "unsupported URL scheme `{}`",
        url.scheme()
    );

    let engine = FetchEngine::new(args.client_config()).context("failed to build HTTP client")?;

    let mut request = FetchRequest::get(url);
    let mut response = FetchResponse::default();
    let mut hop = 0usize;
    let mut log_hop = |r: &FetchResponse| {
        hop += 1;
        info!(
            hop,
            status = r.status().as_u16(),
            location = r.location().unwrap_or(""),
            "response received"
        );
    };

    engine
        .fetch_follow_redirects(&mut request, &mut response, args.max_redirects, Some(&mut log_hop))
        .await
        .with_context(|| format!("failed to fetch {}", args.url))?;

    let decoded = decode_body_with_limit(&response, engine.config().max_body_size());

    // The head is still printed when the body cannot be decoded.
    let mut out = io::stdout().lock();
    if args.include_headers {
        write_head(&mut out, &response)?;
    }
    let body = decoded.context("failed to decode response body")?;

    info!(
        url = %request.url(),
        status = response.status().as_u16(),
        bytes = body.len(),
        "fetch complete"
    );

    out.write_all(&body)?;
    out.flush()?;

    Ok(())
}

fn write_head(out: &mut impl Write, response: &FetchResponse) -> io::Result<()> {
    writeln!(out, "HTTP/1.1 {}", response.status())?;
    for (name, value) in response.headers() {
        writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(out)
}
