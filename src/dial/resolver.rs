//! Dual-stack DNS resolver for reqwest.
//!
//! Implements `reqwest::dns::Resolve` on top of [`resolve_dual_stack`], so the
//! pooled HTTP client sees both address families, interleaved, for every host.
//! The connector then falls back across families instead of failing on the
//! first one the system resolver happened to list.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::debug;

use super::resolve_dual_stack;

/// Resolver handed to the HTTP client for all outbound connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualStackResolver;

impl Resolve for DualStackResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            // The connector overwrites the port with the one from the URL.
            let addrs = resolve_dual_stack(name.as_str(), 0)
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;
            debug!(host = name.as_str(), count = addrs.len(), "dual-stack resolution");
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
