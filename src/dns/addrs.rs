//! Candidate address lists.
//!
//! Turns resolver output into the ordered list a connect job walks through.

use super::hostport::AddressFamily;
use std::net::{IpAddr, SocketAddr};

/// Ordered list of connect candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketAddrs {
    addrs: Vec<SocketAddr>,
}

impl SocketAddrs {
    /// Creates a new `SocketAddrs` from a vector.
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs }
    }

    /// Attempts to parse a host string as an IP address.
    ///
    /// Returns `Some` if the host is a valid IPv4 or IPv6 address,
    /// `None` if it's a hostname that requires DNS resolution.
    pub fn try_parse(host: &str, port: u16) -> Option<Self> {
        let ip: IpAddr = host.parse().ok()?;
        Some(Self {
            addrs: vec![SocketAddr::new(ip, port)],
        })
    }

    /// Returns true if no addresses are available.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Returns the number of addresses.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Gives every address that came back with port 0 the connect port.
    pub fn with_default_port(mut self, port: u16) -> Self {
        for addr in &mut self.addrs {
            if addr.port() == 0 {
                addr.set_port(port);
            }
        }
        self
    }

    /// Drops addresses of the family the caller did not ask for.
    pub fn filter_family(mut self, family: AddressFamily) -> Self {
        self.addrs.retain(|a| family.matches(a));
        self
    }

    /// Removes repeated addresses, keeping the first occurrence.
    pub fn dedup(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.addrs.len());
        self.addrs.retain(|a| {
            if seen.contains(a) {
                false
            } else {
                seen.push(*a);
                true
            }
        });
        self
    }

    /// Alternates address families, starting with the family of the first
    /// address (Happy Eyeballs ordering, RFC 8305 section 4).
    ///
    /// Relative order inside each family is preserved.
    pub fn interleave_families(self) -> Self {
        let prefer_v6 = self.addrs.first().map(|a| a.is_ipv6()).unwrap_or(false);
        let (preferred, fallback): (Vec<_>, Vec<_>) = self
            .addrs
            .into_iter()
            .partition(|a| a.is_ipv6() == prefer_v6);

        let mut addrs = Vec::with_capacity(preferred.len() + fallback.len());
        let mut preferred = preferred.into_iter();
        let mut fallback = fallback.into_iter();
        loop {
            match (preferred.next(), fallback.next()) {
                (None, None) => break,
                (a, b) => addrs.extend(a.into_iter().chain(b)),
            }
        }
        Self { addrs }
    }

    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn into_vec(self) -> Vec<SocketAddr> {
        self.addrs
    }
}

impl FromIterator<SocketAddr> for SocketAddrs {
    fn from_iter<T: IntoIterator<Item = SocketAddr>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
