//! # ticknet
//!
//! Non-blocking TCP connection setup and packet framing for applications that
//! run a fixed-rate main loop.
//!
//! `ticknet` resolves hosts on a background tokio runtime, races connection
//! attempts against the resolved addresses, and reports the outcome from a
//! single per-tick call, so callbacks never run on another thread. Once
//! connected, a [`SocketHandler`](socket::SocketHandler) queues and drains
//! length-prefixed packets without blocking.
//!
//! ## Features
//!
//! - **Staggered connects**: resolver-ordered candidates, a parallel attempt
//!   every 250 ms, per-socket timeouts
//! - **Pluggable DNS**: getaddrinfo, hickory-dns, override tables
//! - **Invite codes**: `+CODE` targets completed by an external coordinator
//! - **Packet framing**: `u16` little-endian size prefix, partial I/O safe
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ticknet::base::neterror::NetError;
//! use ticknet::socket::{ConnectDelegate, ConnectJobPool};
//! use std::net::TcpStream;
//!
//! struct Lobby;
//!
//! impl ConnectDelegate for Lobby {
//!     fn on_connect(&mut self, stream: TcpStream) {
//!         println!("connected to {:?}", stream.peer_addr());
//!     }
//!     fn on_failure(&mut self, error: NetError) {
//!         println!("failed: {error}");
//!     }
//! }
//!
//! let mut pool = ConnectJobPool::new()?;
//! pool.connect_to("server.example.com", 3979, Lobby)?;
//! loop {
//!     pool.check_callbacks();
//!     // ... rest of the tick
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and connect states
//! - [`dns`] - Resolvers and connection strings
//! - [`packet`] - Length-prefixed packet buffer
//! - [`socket`] - Connect jobs, their pool, and the packet socket handler

pub mod base;
pub mod dns;
pub mod packet;
pub mod socket;
