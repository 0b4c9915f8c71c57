//! Connection string parsing.
//!
//! Accepted forms:
//! - `host`, `host:port`
//! - `1.2.3.4`, `1.2.3.4:port`
//! - `::1`, `[::1]`, `[::1]:port`
//! - `+CODE` for an invite code handled by an external coordinator

use super::Name;
use crate::base::neterror::NetError;
use std::fmt;
use std::net::SocketAddr;

/// Address family a connect job is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

/// A host with a port, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    host: Name,
    port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<Name>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host[:port]`, using `default_port` when no port is given.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, NetError> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let end = rest.find(']').ok_or(NetError::AddressInvalid)?;
            let host = &rest[..end];
            let port = match &rest[end + 1..] {
                "" => None,
                tail => Some(tail.strip_prefix(':').ok_or(NetError::AddressInvalid)?),
            };
            (host, port)
        } else {
            match input.matches(':').count() {
                0 => (input, None),
                1 => {
                    let (host, port) = input.split_once(':').ok_or(NetError::AddressInvalid)?;
                    (host, Some(port))
                }
                // bare IPv6 literal, no port possible
                _ => (input, None),
            }
        };

        if host.is_empty() {
            return Err(NetError::AddressInvalid);
        }
        let port = match port {
            None => default_port,
            Some(port) => match port.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(NetError::AddressInvalid),
            },
        };

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &Name {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.as_str().contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// What a server connection string points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// Resolve and connect directly.
    Direct(HostPort),
    /// Ask a coordinator to set up the connection; carries the code without `+`.
    InviteCode(String),
}

impl ServerAddress {
    pub fn parse(input: &str, default_port: u16) -> Result<Self, NetError> {
        let input = input.trim();
        match input.strip_prefix('+') {
            Some("") => Err(NetError::AddressInvalid),
            Some(code) => Ok(ServerAddress::InviteCode(code.to_string())),
            None => HostPort::parse(input, default_port).map(ServerAddress::Direct),
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Direct(hp) => fmt::Display::fmt(hp, f),
            ServerAddress::InviteCode(code) => write!(f, "+{code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_only_uses_default_port() {
        let hp = HostPort::parse("example.com", 3979).unwrap();
        assert_eq!(hp.host().as_str(), "example.com");
        assert_eq!(hp.port(), 3979);
    }

    #[test]
    fn test_host_and_port() {
        let hp = HostPort::parse(" 10.0.0.1:4000 ", 3979).unwrap();
        assert_eq!(hp.host().as_str(), "10.0.0.1");
        assert_eq!(hp.port(), 4000);
        assert_eq!(hp.to_string(), "10.0.0.1:4000");
    }

    #[test]
    fn test_ipv6_forms() {
        let bare = HostPort::parse("fd00::1", 3979).unwrap();
        assert_eq!(bare.host().as_str(), "fd00::1");
        assert_eq!(bare.port(), 3979);

        let bracketed = HostPort::parse("[fd00::1]", 3979).unwrap();
        assert_eq!(bracketed, bare);

        let with_port = HostPort::parse("[::1]:4000", 3979).unwrap();
        assert_eq!(with_port.host().as_str(), "::1");
        assert_eq!(with_port.port(), 4000);
        assert_eq!(with_port.to_string(), "[::1]:4000");
    }

    #[test]
    fn test_invalid_strings() {
        for input in ["", ":4000", "host:", "host:0", "host:70000", "[::1", "[::1]4000", "[]:1"] {
            assert!(
                matches!(HostPort::parse(input, 3979), Err(NetError::AddressInvalid)),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_server_address() {
        assert_eq!(
            ServerAddress::parse("+AbC123", 3979).unwrap(),
            ServerAddress::InviteCode("AbC123".to_string())
        );
        assert!(matches!(ServerAddress::parse("+", 3979), Err(NetError::AddressInvalid)));
        match ServerAddress::parse("server.local:3980", 3979).unwrap() {
            ServerAddress::Direct(hp) => assert_eq!(hp.port(), 3980),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_family_matches() {
        let v4: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let v6: SocketAddr = "[::1]:1".parse().unwrap();
        assert!(AddressFamily::Any.matches(&v4) && AddressFamily::Any.matches(&v6));
        assert!(AddressFamily::Ipv4.matches(&v4) && !AddressFamily::Ipv4.matches(&v6));
        assert!(AddressFamily::Ipv6.matches(&v6) && !AddressFamily::Ipv6.matches(&v4));
    }
}
