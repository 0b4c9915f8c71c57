use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Byte transport under a [`SocketHandler`](crate::socket::handler::SocketHandler).
/// Mimics net::StreamSocket.
///
/// Reads and writes are expected to be non-blocking: `WouldBlock` means "try
/// again next tick", `Ok(0)` from `read` means the peer closed the stream.
pub trait StreamSocket: Read + Write + fmt::Debug {
    /// Address of the remote end.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Shuts down both directions of the transport.
    fn shutdown(&mut self) -> io::Result<()>;

    /// Returns true if the transport still reports a peer.
    /// Note: This is a non-blocking check; it does not test whether the peer is alive.
    fn is_connected(&self) -> bool {
        self.peer_addr().is_ok()
    }
}

impl StreamSocket for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_stream_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        assert_eq!(StreamSocket::peer_addr(&stream).unwrap(), addr);
        assert!(StreamSocket::is_connected(&stream));
        StreamSocket::shutdown(&mut stream).unwrap();
    }
}
