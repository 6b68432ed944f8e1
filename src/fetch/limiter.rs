//! Per-host connection ceiling.
//!
//! Each `host:port` gets its own semaphore with `max_conns_per_host` permits.
//! A request holds one permit from before it is sent until its body has been
//! read, so no host ever sees more concurrent requests than the ceiling.
//! Requests to different hosts never wait on each other.
//!
//! A host's entry is dropped once its last permit is released and nobody is
//! waiting on it, so the map only holds hosts with requests in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

use crate::dial::Authority;

/// Shared per-host semaphores.
///
/// Designed to be shared across tasks behind an `Arc`.
#[derive(Debug)]
pub struct HostLimiter {
    max_per_host: usize,
    /// The inner `Arc` lets the shard lock be released before awaiting a permit.
    hosts: Arc<DashMap<String, Arc<Semaphore>>>,
}

/// One slot on a host, held for the duration of a request.
///
/// Dropping it frees the slot and evicts the host's entry if it went idle.
#[derive(Debug)]
pub struct HostPermit {
    permit: Option<OwnedSemaphorePermit>,
    key: String,
    hosts: Arc<DashMap<String, Arc<Semaphore>>>,
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        // The map's own reference is the only one left when no request holds
        // or awaits this host.
        self.hosts
            .remove_if(&self.key, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

impl HostLimiter {
    /// Creates a limiter allowing `max_per_host` concurrent requests per host.
    ///
    /// `max_per_host` is clamped to at least 1.
    #[must_use]
    pub fn new(max_per_host: usize) -> Self {
        Self {
            max_per_host: max_per_host.max(1),
            hosts: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    /// Waits for a free slot on `authority`.
    ///
    /// The slot is released when the returned permit is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] if the host's semaphore has been closed.
    #[instrument(level = "trace", skip(self), fields(authority = %authority))]
    pub async fn acquire(&self, authority: &Authority) -> Result<HostPermit, AcquireError> {
        let key = host_key(authority);
        let semaphore = self.semaphore_for(&key);
        if semaphore.available_permits() == 0 {
            debug!(max = self.max_per_host, "host at connection ceiling, waiting");
        }
        let permit = semaphore.acquire_owned().await?;
        Ok(HostPermit {
            permit: Some(permit),
            key,
            hosts: Arc::clone(&self.hosts),
        })
    }

    /// Number of hosts with requests in flight or waiting.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    fn semaphore_for(&self, key: &str) -> Arc<Semaphore> {
        Arc::clone(
            self.hosts
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
                .value(),
        )
    }
}

fn host_key(authority: &Authority) -> String {
    authority.to_string().to_ascii_lowercase()
}
