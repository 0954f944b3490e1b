//! Wire-level primitives shared by every message codec.
//!
//! Integers are big-endian with fixed widths. Booleans are a single byte
//! (`0` or non-zero). Strings are a `u16` byte length followed by UTF-8;
//! encoding truncates at 65535 bytes. Lists are a `u16` element count
//! followed by the elements.

use bytes::BufMut;
use thiserror::Error;

/// Why a payload failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload ended before a field could be read in full.
    #[error("payload truncated")]
    Truncated,
    /// A string field held bytes that are not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    /// Bytes remained after the last field of the message.
    #[error("trailing bytes after message payload")]
    TrailingBytes,
    /// An enum field carried a value outside its defined range.
    #[error("invalid discriminant {0}")]
    InvalidDiscriminant(u16),
}

/// Checked, consuming reader over a message payload.
///
/// Every `read_*` either consumes exactly its field or fails without side
/// effects worth caring about; [`WireReader::finish`] enforces that the
/// payload was consumed completely.
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.offset + len > self.data.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Reads a `u16`-count prefixed list, delegating each element.
    pub fn read_list<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.read_u16()? as usize;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            out.push(element(self)?);
        }
        Ok(out)
    }

    /// Fails unless the whole payload has been consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes)
        }
    }
}

pub fn put_bool(out: &mut Vec<u8>, value: bool) {
    out.put_u8(u8::from(value));
}

pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.put_u16(value);
}

pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.put_u32(value);
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.put_u64(value);
}

/// Writes a length-prefixed string, truncating at the `u16` limit.
pub fn put_string(out: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    out.put_u16(len as u16);
    out.extend_from_slice(&bytes[..len]);
}

/// Writes a `u16`-count prefixed list. Counts above `u16::MAX` are a caller
/// bug; the protocol never produces them.
pub fn put_list<T>(out: &mut Vec<u8>, items: &[T], mut element: impl FnMut(&mut Vec<u8>, &T)) {
    out.put_u16(items.len().min(u16::MAX as usize) as u16);
    for item in items.iter().take(u16::MAX as usize) {
        element(out, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut out = Vec::new();
        put_bool(&mut out, true);
        put_u16(&mut out, 0xBEEF);
        put_u32(&mut out, 0xDEADBEEF);
        put_u64(&mut out, 0x0102030405060708);
        put_string(&mut out, "hello");

        let mut reader = WireReader::new(&out);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_u64().unwrap(), 0x0102030405060708);
        assert_eq!(reader.read_string().unwrap(), "hello");
        reader.finish().unwrap();
    }

    #[test]
    fn integers_are_big_endian() {
        let mut out = Vec::new();
        put_u16(&mut out, 0x0102);
        put_u32(&mut out, 0x03040506);
        assert_eq!(out, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut reader = WireReader::new(&[0x00]);
        assert_eq!(reader.read_u16(), Err(DecodeError::Truncated));
    }

    #[test]
    fn string_length_beyond_payload_is_rejected() {
        // Declared length 5, only 2 bytes follow.
        let mut reader = WireReader::new(&[0x00, 0x05, b'h', b'i']);
        assert_eq!(reader.read_string(), Err(DecodeError::Truncated));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut out = Vec::new();
        put_u16(&mut out, 7);
        out.push(0xFF);
        let mut reader = WireReader::new(&out);
        reader.read_u16().unwrap();
        assert_eq!(reader.finish(), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn long_string_is_truncated_at_u16_limit() {
        let long = "x".repeat(70_000);
        let mut out = Vec::new();
        put_string(&mut out, &long);
        let mut reader = WireReader::new(&out);
        let decoded = reader.read_string().unwrap();
        assert_eq!(decoded.len(), u16::MAX as usize);
        reader.finish().unwrap();
    }

    #[test]
    fn list_round_trips() {
        let values = [3u32, 1, 4, 1, 5];
        let mut out = Vec::new();
        put_list(&mut out, &values, |buf, v| put_u32(buf, *v));
        let mut reader = WireReader::new(&out);
        let decoded = reader.read_list(|r| r.read_u32()).unwrap();
        reader.finish().unwrap();
        assert_eq!(decoded, values);
    }
}
