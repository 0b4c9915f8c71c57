//! A single non-blocking `connect()`.
//!
//! The socket is created with `socket2` so it can be made non-blocking and
//! bound before `connect()` is issued. Readiness is checked without waiting:
//! a pending `SO_ERROR` means the attempt failed, a known peer address means
//! it succeeded, `ENOTCONN` means it is still in flight.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Result of a readiness check.
#[derive(Debug)]
pub(crate) enum AttemptStatus {
    Pending,
    Connected,
    Failed(io::Error),
}

/// One in-flight connect towards one candidate address.
#[derive(Debug)]
pub(crate) struct ConnectAttempt {
    socket: Socket,
    addr: SocketAddr,
    started: Instant,
}

impl ConnectAttempt {
    /// Opens a non-blocking socket and issues `connect()` towards `addr`.
    ///
    /// An error here means the candidate failed before anything was in flight
    /// (unsupported family, bind failure, immediate refusal).
    pub(crate) fn start(
        addr: SocketAddr,
        bind: Option<SocketAddr>,
        nodelay: bool,
        now: Instant,
    ) -> Result<Self, NetError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .addr_context(addr)?;

        if nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(addr = %addr, error = %e, "setting TCP_NODELAY failed");
            }
        }
        socket.set_nonblocking(true).addr_context(addr)?;

        if let Some(bind) = bind {
            socket.bind(&bind.into()).addr_context(addr)?;
        }

        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if connect_in_progress(&e) => {}
            Err(e) => return Err(e).addr_context(addr),
        }

        Ok(Self {
            socket,
            addr,
            started: now,
        })
    }

    /// Non-blocking readiness check.
    pub(crate) fn poll(&self) -> AttemptStatus {
        match self.socket.take_error() {
            Ok(Some(e)) | Err(e) => return AttemptStatus::Failed(e),
            Ok(None) => {}
        }

        match self.socket.peer_addr() {
            Ok(_) => AttemptStatus::Connected,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => AttemptStatus::Pending,
            Err(e) => AttemptStatus::Failed(e),
        }
    }

    /// A socket that never had `connect()` issued; it reports Pending forever.
    #[cfg(test)]
    pub(crate) fn unconnected(addr: SocketAddr, now: Instant) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            addr,
            started: now,
        })
    }

    /// Like [`start`](Self::start), except that addresses in 192.0.2.0/24
    /// (TEST-NET-1) get an [`unconnected`](Self::unconnected) socket.
    #[cfg(test)]
    pub(crate) fn start_or_stall(
        addr: SocketAddr,
        bind: Option<SocketAddr>,
        nodelay: bool,
        now: Instant,
    ) -> Result<Self, NetError> {
        match addr.ip() {
            std::net::IpAddr::V4(ip) if ip.octets()[..3] == [192, 0, 2] => {
                Self::unconnected(addr, now).addr_context(addr)
            }
            _ => Self::start(addr, bind, nodelay, now),
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Hands over the connected socket; it stays in non-blocking mode.
    pub(crate) fn into_stream(self) -> TcpStream {
        self.socket.into()
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            return true;
        }
    }
    err.kind() == io::ErrorKind::WouldBlock
}
