//! Canonical binary encoding shared by hashing and the wire protocol.
//!
//! This is deliberately not `serde`/`bincode`: hashing needs a single,
//! stable byte layout that is identical to what goes on the wire, and
//! the `Serializer` trait below is implemented by hand for every type
//! that needs to be hashed or sent to a peer.

use std::convert::TryInto;

use thiserror::Error;

use crate::hash::{Hash, HASH_SIZE};

/// Errors produced while decoding a buffer written by a `Writer`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("not enough bytes remaining to read the requested value")]
    OutOfBounds,
    #[error("varint is larger than the maximum representable value")]
    VarIntTooLarge,
    #[error("invalid enum discriminant: {0}")]
    InvalidValue(u8),
}

/// A cursor over an immutable byte slice used to decode `Serializer` types.
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn total_read(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReaderError> {
        if self.remaining() < len {
            return Err(ReaderError::OutOfBounds);
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let bytes: [u8; 2] = self.read_bytes(2)?.try_into().unwrap();
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let bytes: [u8; 4] = self.read_bytes(4)?.try_into().unwrap();
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes: [u8; 8] = self.read_bytes(8)?.try_into().unwrap();
        Ok(u64::from_be_bytes(bytes))
    }

    /// LEB128 unsigned varint, matching `Writer::write_varint`.
    pub fn read_varint(&mut self) -> Result<u64, ReaderError> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            if shift >= 64 {
                return Err(ReaderError::VarIntTooLarge);
            }
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }

    pub fn read_vec_u8(&mut self) -> Result<Vec<u8>, ReaderError> {
        let len = self.read_varint()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let bytes: [u8; HASH_SIZE] = self.read_bytes(HASH_SIZE)?.try_into().unwrap();
        Ok(Hash::new(bytes))
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], ReaderError> {
        Ok(self.read_bytes(N)?.try_into().unwrap())
    }
}

/// An append-only byte buffer written to by `Serializer::write` implementations.
#[derive(Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    /// LEB128 unsigned varint.
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                break;
            } else {
                self.bytes.push(byte | 0x80);
            }
        }
    }

    pub fn write_vec_u8(&mut self, value: &[u8]) {
        self.write_varint(value.len() as u64);
        self.bytes.extend_from_slice(value);
    }

    pub fn write_hash(&mut self, hash: &Hash) {
        self.bytes.extend_from_slice(hash.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

/// Implemented by every type with a canonical binary encoding.
///
/// `size()` must equal `write(&mut Writer::new()).bytes().len()`; it
/// exists so callers can pre-size buffers without actually encoding.
pub trait Serializer: Sized {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError>;
    fn write(&self, writer: &mut Writer);

    fn size(&self) -> usize {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.bytes().len()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(self.size());
        self.write(&mut writer);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let mut reader = Reader::new(bytes);
        Self::read(&mut reader)
    }
}

impl Serializer for u64 {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_u64(*self);
    }

    fn size(&self) -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn varint_round_trips() {
        for value in [0u64, 1, 127, 128, 300, 16384, u64::MAX] {
            let mut writer = Writer::new();
            writer.write_varint(value);
            let mut reader = Reader::new(writer.bytes());
            assert_eq!(reader.read_varint().unwrap(), value);
        }
    }

    proptest! {
        #[test]
        fn varint_round_trips_for_any_u64(value: u64) {
            let mut writer = Writer::new();
            writer.write_varint(value);
            let mut reader = Reader::new(writer.bytes());
            prop_assert_eq!(reader.read_varint().unwrap(), value);
            prop_assert_eq!(reader.total_read(), writer.bytes().len());
        }

        #[test]
        fn vec_u8_round_trips_for_any_bytes(bytes: Vec<u8>) {
            let mut writer = Writer::new();
            writer.write_vec_u8(&bytes);
            let mut reader = Reader::new(writer.bytes());
            prop_assert_eq!(reader.read_vec_u8().unwrap(), bytes);
        }
    }

    #[test]
    fn read_bytes_out_of_bounds() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(reader.read_bytes(4), Err(ReaderError::OutOfBounds));
    }

    #[test]
    fn u64_serializer_size_matches_written_len() {
        let value: u64 = 42;
        assert_eq!(value.size(), value.to_bytes().len());
    }
}
