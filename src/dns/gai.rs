//! System DNS resolver using getaddrinfo.
//!
//! getaddrinfo has no portable non-blocking form, so the lookup runs on
//! tokio's blocking pool. A lookup that hangs only ties up that pool thread;
//! nothing waits on it except the resolution task of its connect job.

use super::{Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::{
    io,
    net::ToSocketAddrs,
    time::{Duration, Instant},
};

/// Lookups slower than this are logged at `info`.
const SLOW_LOOKUP: Duration = Duration::from_secs(1);

/// System DNS resolver using `getaddrinfo` in a thread pool.
///
/// Must be driven from inside a tokio runtime; connect jobs always are.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    /// Creates a new `GaiResolver`.
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let domain = host.clone();

            let result = tokio::task::spawn_blocking(move || {
                tracing::debug!(host = %host, "resolving via getaddrinfo");
                let start = Instant::now();
                let addrs = (host.as_str(), 0u16)
                    .to_socket_addrs()
                    .map(|iter| iter.collect::<Vec<_>>());
                let elapsed = start.elapsed();
                if elapsed > SLOW_LOOKUP {
                    tracing::info!(host = %host, elapsed_ms = elapsed.as_millis() as u64, "slow getaddrinfo");
                }
                addrs
            })
            .await;

            // Handle task join error (cancellation, panic)
            let addrs = result
                .map_err(|e| {
                    tracing::error!(error = %e, "DNS resolution task failed");
                    NetError::NameResolutionFailed
                })?
                .dns_context(&domain)
                .inspect_err(|e| tracing::debug!(domain = %domain, error = %e, "DNS resolution failed"))?;

            if addrs.is_empty() {
                return Err(NetError::dns_failed(
                    &domain,
                    io::Error::new(io::ErrorKind::NotFound, "No addresses returned by getaddrinfo"),
                ));
            }

            tracing::debug!(domain = %domain, count = addrs.len(), "DNS resolution complete");
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}
