//! Length-prefixed frame codec.
//!
//! Frames carry an 8-byte big-endian header (`length: u32`, `type: u16`,
//! `version: u16`) followed by `length` payload bytes. [`FrameDecoder`]
//! accumulates stream chunks and yields complete frames; a partial frame
//! stays buffered until the rest of it arrives.

use bytes::{Buf, BytesMut};

/// Fixed size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub length: u32,
    /// Raw packet type code (see [`crate::PacketType`]).
    pub packet_type: u16,
    /// Protocol version the client spoke for this frame.
    pub version: u16,
}

/// Encodes a single frame: header followed by the payload.
pub fn encode_frame(packet_type: u16, version: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&packet_type.to_be_bytes());
    frame.extend_from_slice(&version.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incremental frame decoder over a byte stream.
///
/// Feed arbitrary chunks with [`append`](Self::append) and drain complete
/// frames with [`next_frame`](Self::next_frame). The only per-frame
/// allocation is the payload copy handed to the caller.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw stream bytes to the internal buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete frame, or `None` if the buffer holds less
    /// than a full frame. The frame length is peeked without consuming, so
    /// a partial frame survives across calls.
    pub fn next_frame(&mut self) -> Option<(FrameHeader, Vec<u8>)> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]);
        let total = FRAME_HEADER_SIZE + length as usize;
        if self.buffer.len() < total {
            return None;
        }

        let mut frame = self.buffer.split_to(total);
        frame.advance(4);
        let packet_type = frame.get_u16();
        let version = frame.get_u16();
        let header = FrameHeader {
            length,
            packet_type,
            version,
        };
        Some((header, frame.to_vec()))
    }

    /// Bytes currently buffered, including any partial frame.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}
