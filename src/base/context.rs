//! Error context helpers.
//!
//! Extension traits that turn `std::io::Error`s coming out of sockets and
//! getaddrinfo into context-rich [`NetError`] values.

use crate::base::neterror::NetError;
use std::io;
use std::net::SocketAddr;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Attach the candidate address a connect attempt was aimed at.
    ///
    /// # Example
    /// ```ignore
    /// use ticknet::base::context::IoResultExt;
    ///
    /// socket.bind(&bind.into()).addr_context(addr)?;
    /// // Error: "Connection to 192.0.2.7:3979 failed: address in use"
    /// ```
    fn addr_context(self, addr: SocketAddr) -> Result<T, NetError>;

    /// Attach the looked-up domain to a resolver error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Map an error on an established connection to its error code.
    fn transport_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn addr_context(self, addr: SocketAddr) -> Result<T, NetError> {
        self.map_err(|e| NetError::connection_failed_to(&addr.ip().to_string(), addr.port(), e))
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }

    fn transport_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::from_io(&e))
    }
}
