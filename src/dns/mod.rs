//! DNS Resolution Module
//!
//! Provides pluggable DNS resolution with support for:
//! - System resolver (getaddrinfo via thread pool)
//! - Async hickory-dns resolver
//! - Hostname-to-address overrides and fixed address lists
//!
//! # Architecture
//!
//! This module mirrors Chromium's `HostResolver` concept. The `Resolve` trait
//! is the core abstraction; connect jobs run it on a background task and only
//! ever see its finished result.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticknet::dns::{HostPort, Name, Resolve, GaiResolver};
//!
//! let target = HostPort::parse("example.com", 3979)?;
//! let addrs = GaiResolver::new().resolve(target.host().clone()).await?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

mod addrs;
mod gai;
mod hickory;
mod hostport;
mod resolve;

pub use addrs::SocketAddrs;
pub use gai::GaiResolver;
pub use hickory::HickoryResolver;
pub use hostport::{AddressFamily, HostPort, ServerAddress};
pub use resolve::{Addrs, DnsResolverWithOverrides, Name, Resolve, Resolving, StaticResolver};
