//! Socket and connection management.
//!
//! Mirrors the split of Chromium's `net/socket/`:
//! - [`pool`]: registry of live connect jobs, polled once per tick
//! - [`connectjob`]: resolve -> staggered TCP connect for one target
//! - [`handler`]: length-prefixed packet queues over a connected stream
//! - [`config`]: timing and size limits

mod attempt;
pub mod client;
pub mod config;
pub mod connectjob;
pub mod handler;
pub mod pool;

pub use client::StreamSocket;
pub use config::{ConfigError, ConnectConfig, HandlerConfig};
pub use connectjob::{
    AttemptOutcome, AttemptRecord, ConnectDelegate, ConnectJob, ConnectJobHandle, ConnectTarget,
};
pub use handler::{SendState, SocketHandler};
pub use pool::{ConnectJobPool, ConnectJobPoolBuilder};
