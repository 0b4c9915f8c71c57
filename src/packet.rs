//! Length-prefixed packets.
//!
//! Every packet on the wire is a little-endian `u16` total size followed by the
//! payload:
//!
//! ```text
//! +-------------------+--------------------+
//! | size (2 bytes)    |   payload          |
//! | u16 little-endian |   (size - 2 bytes) |
//! +-------------------+--------------------+
//! ```
//!
//! The size includes the two prefix bytes, so the smallest valid packet is 2
//! bytes long. A [`Packet`] keeps a cursor that serves two purposes: while
//! sending or receiving it counts the bytes already moved through the
//! transport, and after [`Packet::prepare_to_read`] it is the read position for
//! the `recv_*` accessors.

use crate::base::neterror::NetError;
use bytes::{BufMut, BytesMut};
use std::io::{self, Read, Write};

/// Width of the size prefix.
pub const PACKET_SIZE_SIZE: usize = std::mem::size_of::<u16>();

/// Largest packet this crate builds or accepts by default.
pub const TCP_MTU: usize = 32767;

/// A length-prefixed byte buffer with a transfer/read cursor.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buffer: BytesMut,
    pos: usize,
    limit: usize,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// Creates an empty outbound packet limited to [`TCP_MTU`] bytes.
    pub fn new() -> Self {
        Self::with_limit(TCP_MTU)
    }

    /// Creates an empty outbound packet limited to `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.clamp(PACKET_SIZE_SIZE, u16::MAX as usize);
        let mut buffer = BytesMut::with_capacity(64);
        buffer.put_u16_le(0);
        Self {
            buffer,
            pos: 0,
            limit,
        }
    }

    /// Creates an outbound packet holding `payload`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        let mut packet = Self::new();
        packet.send_bytes(payload)?;
        Ok(packet)
    }

    /// Creates an inbound packet that accepts a declared size up to `limit`.
    pub(crate) fn for_receive(limit: usize) -> Self {
        Self {
            buffer: BytesMut::zeroed(PACKET_SIZE_SIZE),
            pos: 0,
            limit: limit.clamp(PACKET_SIZE_SIZE, u16::MAX as usize),
        }
    }

    /// Total size in bytes, prefix included.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes after the size prefix.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[PACKET_SIZE_SIZE..]
    }

    /// Whether `bytes_to_write` more bytes fit under the size limit.
    pub fn can_write_to_packet(&self, bytes_to_write: usize) -> bool {
        self.buffer.len() + bytes_to_write <= self.limit
    }

    fn ensure_room(&self, bytes_to_write: usize) -> Result<(), NetError> {
        if self.can_write_to_packet(bytes_to_write) {
            Ok(())
        } else {
            Err(NetError::MsgTooBig)
        }
    }

    pub fn send_bool(&mut self, value: bool) -> Result<(), NetError> {
        self.send_u8(value as u8)
    }

    pub fn send_u8(&mut self, value: u8) -> Result<(), NetError> {
        self.ensure_room(1)?;
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn send_u16(&mut self, value: u16) -> Result<(), NetError> {
        self.ensure_room(2)?;
        self.buffer.put_u16_le(value);
        Ok(())
    }

    pub fn send_u32(&mut self, value: u32) -> Result<(), NetError> {
        self.ensure_room(4)?;
        self.buffer.put_u32_le(value);
        Ok(())
    }

    pub fn send_u64(&mut self, value: u64) -> Result<(), NetError> {
        self.ensure_room(8)?;
        self.buffer.put_u64_le(value);
        Ok(())
    }

    /// Appends a NUL-terminated string.
    pub fn send_string(&mut self, value: &str) -> Result<(), NetError> {
        if value.as_bytes().contains(&0) {
            return Err(NetError::InvalidPacket);
        }
        self.ensure_room(value.len() + 1)?;
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_u8(0);
        Ok(())
    }

    /// Appends raw bytes without any length marker.
    pub fn send_bytes(&mut self, value: &[u8]) -> Result<(), NetError> {
        self.ensure_room(value.len())?;
        self.buffer.put_slice(value);
        Ok(())
    }

    /// Writes the size prefix and rewinds the cursor for transfer.
    pub(crate) fn prepare_to_send(&mut self) {
        // with_limit caps the buffer at u16::MAX
        let size = self.buffer.len() as u16;
        self.buffer[..PACKET_SIZE_SIZE].copy_from_slice(&size.to_le_bytes());
        self.pos = 0;
    }

    /// Bytes not yet moved through the transport.
    pub(crate) fn remaining_bytes_to_transfer(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Writes as much of the untransferred part as `writer` accepts.
    pub(crate) fn transfer_out<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        let written = writer.write(&self.buffer[self.pos..])?;
        self.pos += written;
        Ok(written)
    }

    /// Reads into the unfilled part of the buffer.
    pub(crate) fn transfer_in<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let read = reader.read(&mut self.buffer[self.pos..])?;
        self.pos += read;
        Ok(read)
    }

    /// Whether the size prefix has been fully received.
    pub(crate) fn has_packet_size_data(&self) -> bool {
        self.pos >= PACKET_SIZE_SIZE
    }

    /// Validates the received size prefix and grows the buffer to match.
    pub(crate) fn parse_packet_size(&mut self) -> Result<(), NetError> {
        let size = u16::from_le_bytes([self.buffer[0], self.buffer[1]]) as usize;
        if size < PACKET_SIZE_SIZE {
            return Err(NetError::InvalidPacket);
        }
        if size > self.limit {
            return Err(NetError::MsgTooBig);
        }
        self.buffer.resize(size, 0);
        Ok(())
    }

    /// Moves the cursor to the first payload byte.
    pub fn prepare_to_read(&mut self) {
        self.pos = PACKET_SIZE_SIZE;
    }

    /// Payload bytes not yet consumed by `recv_*`.
    pub fn remaining_bytes_to_read(&self) -> usize {
        self.buffer.len().saturating_sub(self.pos)
    }

    fn take(&mut self, count: usize) -> Result<&[u8], NetError> {
        if self.pos < PACKET_SIZE_SIZE || self.remaining_bytes_to_read() < count {
            return Err(NetError::PacketReadPastEnd);
        }
        let start = self.pos;
        self.pos += count;
        Ok(&self.buffer[start..self.pos])
    }

    pub fn recv_bool(&mut self) -> Result<bool, NetError> {
        Ok(self.recv_u8()? != 0)
    }

    pub fn recv_u8(&mut self) -> Result<u8, NetError> {
        Ok(self.take(1)?[0])
    }

    pub fn recv_u16(&mut self) -> Result<u16, NetError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn recv_u32(&mut self) -> Result<u32, NetError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn recv_u64(&mut self) -> Result<u64, NetError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a NUL-terminated string.
    pub fn recv_string(&mut self) -> Result<String, NetError> {
        if self.pos < PACKET_SIZE_SIZE {
            return Err(NetError::PacketReadPastEnd);
        }
        let rest = &self.buffer[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(NetError::PacketReadPastEnd)?;
        let value = std::str::from_utf8(&rest[..len])
            .map_err(|_| NetError::InvalidPacket)?
            .to_string();
        self.pos += len + 1;
        Ok(value)
    }

    /// Reads exactly `count` raw bytes.
    pub fn recv_bytes(&mut self, count: usize) -> Result<Vec<u8>, NetError> {
        Ok(self.take(count)?.to_vec())
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("size", &self.buffer.len())
            .field("pos", &self.pos)
            .field("limit", &self.limit)
            .finish()
    }
}
