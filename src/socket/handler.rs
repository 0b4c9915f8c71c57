//! Packet traffic over an established connection.
//!
//! A [`SocketHandler`] owns the transport, a FIFO of outbound packets and the
//! one inbound packet being assembled. It never blocks: both directions move
//! whatever the transport accepts right now and pick up where they left off
//! on the next call.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::packet::Packet;
use crate::socket::client::StreamSocket;
use crate::socket::config::HandlerConfig;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

/// Result of [`SocketHandler::send_packets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// The handler is closed.
    Closed,
    /// Nothing could be written; the queue is unchanged.
    NoneSent,
    /// Some bytes went out but packets are still queued.
    PartlySent,
    /// The queue is empty.
    AllSent,
}

/// Send queue and receive buffer for one connection.
#[derive(Debug)]
pub struct SocketHandler<S: StreamSocket> {
    socket: Option<S>,
    send_queue: VecDeque<Packet>,
    receive: Option<Packet>,
    writable: bool,
    config: HandlerConfig,
}

impl<S: StreamSocket> SocketHandler<S> {
    pub fn new(socket: S) -> Self {
        Self::with_config(socket, HandlerConfig::default())
    }

    pub fn with_config(socket: S, config: HandlerConfig) -> Self {
        Self {
            socket: Some(socket),
            send_queue: VecDeque::new(),
            receive: None,
            writable: true,
            config,
        }
    }

    /// Whether the transport is still held.
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// False after a flush stopped on a full transport buffer, until a later
    /// flush drains the queue.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn has_send_queue(&self) -> bool {
        !self.send_queue.is_empty()
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, NetError> {
        match &self.socket {
            Some(socket) => socket.peer_addr().transport_context(),
            None => Err(NetError::SocketNotConnected),
        }
    }

    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// Queues `packet` behind everything already queued.
    ///
    /// Does nothing once the handler is closed.
    pub fn send_packet(&mut self, mut packet: Packet) {
        if self.socket.is_none() {
            tracing::trace!(size = packet.size(), "dropping packet queued after close");
            return;
        }
        packet.prepare_to_send();
        self.send_queue.push_back(packet);
    }

    /// Writes queued packets until the queue is empty or the transport stops
    /// accepting data.
    ///
    /// A transport error closes the handler and is returned once; afterwards
    /// the result is `Ok(SendState::Closed)`.
    pub fn send_packets(&mut self) -> Result<SendState, NetError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(SendState::Closed);
        };

        let mut sent_any = false;
        while let Some(packet) = self.send_queue.front_mut() {
            match packet.transfer_out(socket) {
                Ok(0) => {
                    self.close();
                    return Err(NetError::ConnectionClosed);
                }
                Ok(_) => {
                    sent_any = true;
                    if packet.remaining_bytes_to_transfer() == 0 {
                        self.send_queue.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.writable = false;
                    return Ok(if sent_any {
                        SendState::PartlySent
                    } else {
                        SendState::NoneSent
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "send failed, closing connection");
                    self.close();
                    return Err(e).transport_context();
                }
            }
        }

        self.writable = true;
        Ok(SendState::AllSent)
    }

    /// Reads whatever is available into the packet being assembled.
    ///
    /// Returns the packet, positioned for `recv_*`, once all of its declared
    /// bytes arrived. End of stream, a transport error or a bad size prefix
    /// closes the handler and is returned once; a closed handler returns
    /// `Ok(None)`.
    pub fn receive_packet(&mut self) -> Result<Option<Packet>, NetError> {
        let limit = self.config.max_packet_size;
        let Some(socket) = self.socket.as_mut() else {
            return Ok(None);
        };
        let packet = self
            .receive
            .get_or_insert_with(|| Packet::for_receive(limit));

        loop {
            if packet.has_packet_size_data() {
                if let Err(e) = packet.parse_packet_size() {
                    tracing::warn!(error = %e, limit, "invalid packet size, closing connection");
                    self.close();
                    return Err(e);
                }
                if packet.remaining_bytes_to_transfer() == 0 {
                    break;
                }
            }

            match packet.transfer_in(socket) {
                Ok(0) => {
                    tracing::debug!("connection closed by peer");
                    self.close();
                    return Err(NetError::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "receive failed, closing connection");
                    self.close();
                    return Err(e).transport_context();
                }
            }
        }

        Ok(self.receive.take().map(|mut packet| {
            packet.prepare_to_read();
            packet
        }))
    }

    /// Shuts the transport down and drops queued and partial packets.
    /// Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.shutdown() {
                tracing::trace!(error = %e, "shutdown on close failed");
            }
            if !self.send_queue.is_empty() {
                tracing::debug!(packets = self.send_queue.len(), "discarding queued packets");
            }
        }
        self.send_queue.clear();
        self.receive = None;
        self.writable = false;
    }
}

impl<S: StreamSocket> Drop for SocketHandler<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TCP_MTU;
    use std::cell::RefCell;
    use std::io::{Read, Write};
    use std::rc::Rc;

    /// Transport whose behaviour the test changes between calls.
    #[derive(Debug, Default)]
    struct MockState {
        incoming: VecDeque<u8>,
        eof: bool,
        written: Vec<u8>,
        write_budget: usize,
        write_error: Option<io::ErrorKind>,
        read_error: Option<io::ErrorKind>,
        shutdown: bool,
    }

    #[derive(Debug, Clone, Default)]
    struct MockSocket(Rc<RefCell<MockState>>);

    impl Read for MockSocket {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.0.borrow_mut();
            if let Some(kind) = state.read_error {
                return Err(kind.into());
            }
            if state.incoming.is_empty() {
                return if state.eof {
                    Ok(0)
                } else {
                    Err(io::ErrorKind::WouldBlock.into())
                };
            }
            let n = buf.len().min(state.incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = state.incoming.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for MockSocket {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.0.borrow_mut();
            if let Some(kind) = state.write_error {
                return Err(kind.into());
            }
            if state.write_budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(state.write_budget);
            state.write_budget -= n;
            state.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StreamSocket for MockSocket {
        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:3979".parse().unwrap())
        }

        fn shutdown(&mut self) -> io::Result<()> {
            self.0.borrow_mut().shutdown = true;
            Ok(())
        }
    }

    fn packet(payload: &[u8]) -> Packet {
        Packet::from_payload(payload).unwrap()
    }

    fn wire(payload: &[u8]) -> Vec<u8> {
        let mut bytes = ((payload.len() + 2) as u16).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_partial_writes_keep_order() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        handler.send_packet(packet(b"one"));
        handler.send_packet(packet(b"two!"));
        handler.send_packet(packet(b"three"));
        assert!(handler.has_send_queue());

        assert_eq!(handler.send_packets().unwrap(), SendState::NoneSent);
        assert!(!handler.is_writable());

        let total = wire(b"one").len() + wire(b"two!").len() + wire(b"three").len();
        let mut states = Vec::new();
        loop {
            mock.0.borrow_mut().write_budget = 4;
            let state = handler.send_packets().unwrap();
            states.push(state);
            if state == SendState::AllSent {
                break;
            }
            assert_eq!(state, SendState::PartlySent);
        }
        assert_eq!(states.len(), total.div_ceil(4));
        assert!(!handler.has_send_queue());
        assert!(handler.is_writable());

        let mut expected = wire(b"one");
        expected.extend(wire(b"two!"));
        expected.extend(wire(b"three"));
        assert_eq!(mock.0.borrow().written, expected);
    }

    #[test]
    fn test_empty_queue_is_all_sent() {
        let mut handler = SocketHandler::new(MockSocket::default());
        assert_eq!(handler.send_packets().unwrap(), SendState::AllSent);
    }

    #[test]
    fn test_split_receive_yields_one_packet() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        let bytes = wire(b"8 bytes!");
        assert_eq!(bytes.len(), 10);

        mock.0.borrow_mut().incoming.extend(&bytes[..3]);
        assert!(handler.receive_packet().unwrap().is_none());
        mock.0.borrow_mut().incoming.extend(&bytes[3..7]);
        assert!(handler.receive_packet().unwrap().is_none());
        mock.0.borrow_mut().incoming.extend(&bytes[7..]);

        let mut received = handler.receive_packet().unwrap().unwrap();
        assert_eq!(received.size(), 10);
        assert_eq!(received.recv_bytes(8).unwrap(), b"8 bytes!");
        assert!(handler.receive_packet().unwrap().is_none());
    }

    #[test]
    fn test_back_to_back_packets() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        {
            let mut state = mock.0.borrow_mut();
            state.incoming.extend(wire(b"a"));
            state.incoming.extend(wire(b""));
            state.incoming.extend(wire(b"bc"));
        }

        let sizes: Vec<usize> = std::iter::from_fn(|| handler.receive_packet().unwrap())
            .map(|p| p.size())
            .collect();
        assert_eq!(sizes, vec![3, 2, 4]);
    }

    #[test]
    fn test_close_discards_queue() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        handler.send_packet(packet(b"queued"));
        handler.close();

        assert!(mock.0.borrow().shutdown);
        assert!(!handler.is_connected());
        assert!(!handler.has_send_queue());

        handler.send_packet(packet(b"late"));
        assert!(!handler.has_send_queue());
        assert_eq!(handler.send_packets().unwrap(), SendState::Closed);
        assert!(handler.receive_packet().unwrap().is_none());
        assert!(matches!(handler.peer_addr(), Err(NetError::SocketNotConnected)));
        handler.close();
        assert!(mock.0.borrow().written.is_empty());
    }

    #[test]
    fn test_end_of_stream_closes_once() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        {
            let mut state = mock.0.borrow_mut();
            state.incoming.extend(&wire(b"cut")[..3]);
            state.eof = true;
        }

        assert!(matches!(handler.receive_packet(), Err(NetError::ConnectionClosed)));
        assert!(!handler.is_connected());
        assert!(handler.receive_packet().unwrap().is_none());
    }

    #[test]
    fn test_write_error_closes_once() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        handler.send_packet(packet(b"data"));
        mock.0.borrow_mut().write_error = Some(io::ErrorKind::ConnectionReset);

        assert!(matches!(handler.send_packets(), Err(NetError::ConnectionReset)));
        assert_eq!(handler.send_packets().unwrap(), SendState::Closed);
    }

    #[test]
    fn test_read_error_maps_to_code_and_closes_once() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        mock.0.borrow_mut().read_error = Some(io::ErrorKind::ConnectionAborted);

        assert!(matches!(handler.receive_packet(), Err(NetError::ConnectionAborted)));
        assert!(!handler.is_connected());
        assert!(mock.0.borrow().shutdown);
        assert!(handler.receive_packet().unwrap().is_none());
    }

    #[test]
    fn test_broken_pipe_is_connection_closed() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        handler.send_packet(packet(b"data"));
        mock.0.borrow_mut().write_error = Some(io::ErrorKind::BrokenPipe);

        let err = handler.send_packets().unwrap_err();
        assert!(matches!(err, NetError::ConnectionClosed));
        assert!(err.is_connection_closed());
        assert!(!handler.has_send_queue());
    }

    #[test]
    fn test_oversized_and_undersized_packets_rejected() {
        let mock = MockSocket::default();
        let config = HandlerConfig::new().max_packet_size(16);
        let mut handler = SocketHandler::with_config(mock.clone(), config);
        mock.0.borrow_mut().incoming.extend(17u16.to_le_bytes());
        assert!(matches!(handler.receive_packet(), Err(NetError::MsgTooBig)));
        assert!(!handler.is_connected());

        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        mock.0.borrow_mut().incoming.extend(1u16.to_le_bytes());
        assert!(matches!(handler.receive_packet(), Err(NetError::InvalidPacket)));
    }

    #[test]
    fn test_default_limit_accepts_mtu() {
        let mock = MockSocket::default();
        let mut handler = SocketHandler::new(mock.clone());
        let payload = vec![7u8; TCP_MTU - 2];
        mock.0.borrow_mut().incoming.extend(wire(&payload));

        let received = handler.receive_packet().unwrap().unwrap();
        assert_eq!(received.size(), TCP_MTU);
        assert_eq!(handler.peer_addr().unwrap().port(), 3979);
    }
}
