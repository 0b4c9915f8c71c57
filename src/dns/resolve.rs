//! Core DNS resolution types and traits.
//!
//! This module defines the `Resolve` trait and the resolvers that wrap other
//! resolvers or answer from a fixed table.

use crate::base::neterror::NetError;
use std::{collections::HashMap, fmt, future::Future, net::SocketAddr, pin::Pin, sync::Arc};

/// A domain name to resolve into IP addresses.
///
/// This is a lightweight wrapper around a hostname string that provides
/// a type-safe way to pass domain names to resolvers.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    /// Creates a new [`Name`] from any string-like type.
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    /// View the hostname as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

/// Alias for an `Iterator` trait object over `SocketAddr`.
pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Trait for DNS resolution.
///
/// Connect jobs run the returned future on a background task, never on the
/// main loop, so implementations are free to block inside
/// `spawn_blocking` or to await network I/O.
///
/// # Design Notes
///
/// - The order of the returned addresses is the order they are tried in.
/// - Uses `&self` for concurrent resolution without mutable access.
/// - Returns boxed futures for trait object compatibility.
pub trait Resolve: Send + Sync {
    /// Resolves a domain name to IP addresses.
    ///
    /// Addresses with port 0 receive the port of the connection string;
    /// a non-zero port is used as is.
    fn resolve(&self, name: Name) -> Resolving;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Resolving {
        (**self).resolve(name)
    }
}

/// Resolver that answers every name with the same address list.
///
/// An empty list produces [`NetError::NameNotResolved`].
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addrs: Vec<SocketAddr>,
}

impl StaticResolver {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs }
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, _name: Name) -> Resolving {
        let result = if self.addrs.is_empty() {
            Err(NetError::NameNotResolved)
        } else {
            Ok(Box::new(self.addrs.clone().into_iter()) as Addrs)
        };
        Box::pin(std::future::ready(result))
    }
}

/// DNS resolver wrapper that supports hostname overrides.
///
/// Names found in the override table resolve without touching the inner
/// resolver. Useful for:
/// - Testing without real DNS
/// - Pinning a server name to a fixed list of endpoints
/// - Local development with custom hostnames
///
/// # Example
///
/// ```rust,ignore
/// use ticknet::dns::{DnsResolverWithOverrides, GaiResolver};
/// use std::sync::Arc;
///
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()))
///     .with_override("lobby.local", vec!["127.0.0.1:3979".parse().unwrap()]);
/// ```
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: Arc<HashMap<Name, Vec<SocketAddr>>>,
}

impl DnsResolverWithOverrides {
    /// Creates a resolver with an empty override table.
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self {
            inner,
            overrides: Arc::new(HashMap::new()),
        }
    }

    /// Adds or replaces the addresses returned for `host`.
    pub fn with_override(mut self, host: impl Into<Name>, addrs: Vec<SocketAddr>) -> Self {
        Arc::make_mut(&mut self.overrides).insert(host.into(), addrs);
        self
    }

    /// Returns the number of configured overrides.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Resolving {
        if let Some(addrs) = self.overrides.get(&name) {
            tracing::trace!(domain = %name, count = addrs.len(), "resolved from override table");
            let addrs: Addrs = Box::new(addrs.clone().into_iter());
            return Box::pin(std::future::ready(Ok(addrs)));
        }
        self.inner.resolve(name)
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("override_count", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_name_from_str() {
        let name = Name::from("example.com");
        assert_eq!(name.as_str(), "example.com");
        assert_eq!(name.to_string(), "example.com");
    }

    #[test]
    fn test_name_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(Name::new("example.com"));
        set.insert(Name::from(String::from("example.com")));

        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_static_resolver_keeps_order() {
        let resolver = StaticResolver::new(vec![
            "10.0.0.2:0".parse().unwrap(),
            "10.0.0.1:0".parse().unwrap(),
        ]);
        let addrs: Vec<_> = resolver.resolve(Name::new("any")).await.unwrap().collect();
        assert_eq!(addrs[0].ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(addrs[1].ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[tokio::test]
    async fn test_static_resolver_empty_is_error() {
        let result = StaticResolver::default().resolve(Name::new("any")).await;
        assert!(matches!(result, Err(NetError::NameNotResolved)));
    }

    #[tokio::test]
    async fn test_override_resolver_hit_and_miss() {
        let inner = Arc::new(StaticResolver::new(vec![SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            0,
        )]));
        let resolver = DnsResolverWithOverrides::new(inner).with_override(
            "override.local",
            vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3979)],
        );
        assert_eq!(resolver.override_count(), 1);

        let hit: Vec<_> = resolver.resolve(Name::new("override.local")).await.unwrap().collect();
        assert_eq!(hit, vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3979)]);

        let miss: Vec<_> = resolver.resolve(Name::new("other.com")).await.unwrap().collect();
        assert_eq!(miss[0].ip(), IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
