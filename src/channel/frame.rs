//! Wire layout of one logical message.
//!
//! A frame is a `u32` little-endian body length followed by the body.
//! Integers inside a body are a `u32` LE byte count plus the little-endian
//! magnitude, the same layout the key files use.
//!
//! - public key: `e`, `n`
//! - ciphertext: `u64` LE plaintext length, `u32` LE block count, blocks

use std::io::{Read, Write};
use num_bigint::BigUint;
use crate::channel::ChannelError;
use crate::rsa::codec::Ciphertext;
use crate::rsa::keys::Key;

pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

pub fn write_frame<W: Write + ?Sized>(writer: &mut W, body: &[u8], max_frame: usize) -> Result<(), ChannelError> {
    if body.len() > max_frame || body.len() > u32::MAX as usize {
        return Err(ChannelError::Protocol(format!("frame of {} bytes exceeds the {} byte limit", body.len(), max_frame)));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Blocks until a whole frame arrived. The length is checked before the
/// body is allocated.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R, max_frame: usize) -> Result<Vec<u8>, ChannelError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > max_frame {
        return Err(ChannelError::Protocol(format!("peer announced a {} byte frame, limit is {}", len, max_frame)));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

fn put_int(buf: &mut Vec<u8>, v: &BigUint) {
    let bytes = v.to_bytes_le();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&bytes);
}

struct BodyReader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> BodyReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, at: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ChannelError> {
        let end = self.at.checked_add(len).filter(|end| *end <= self.data.len())
            .ok_or_else(|| ChannelError::Protocol("message body truncated".to_string()))?;
        let res = &self.data[self.at..end];
        self.at = end;
        Ok(res)
    }

    fn u32(&mut self) -> Result<u32, ChannelError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, ChannelError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn int(&mut self) -> Result<BigUint, ChannelError> {
        let len = self.u32()? as usize;
        Ok(BigUint::from_bytes_le(self.take(len)?))
    }

    /// An integer of 1 to `max_len` bytes; zero is encoded as one byte.
    fn bounded_int(&mut self, max_len: usize) -> Result<BigUint, ChannelError> {
        let len = self.u32()? as usize;
        if len == 0 || len > max_len {
            return Err(ChannelError::Protocol(format!("block of {} bytes, expected 1 to {}", len, max_len)));
        }
        Ok(BigUint::from_bytes_le(self.take(len)?))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.at
    }

    fn finish(self) -> Result<(), ChannelError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ChannelError::Protocol(format!("{} trailing bytes after message", n)))
        }
    }
}

pub fn encode_key(key: &Key) -> Vec<u8> {
    let mut buf = Vec::new();
    put_int(&mut buf, &key.base);
    put_int(&mut buf, &key.m);
    buf
}

pub fn decode_key(body: &[u8]) -> Result<Key, ChannelError> {
    let mut r = BodyReader::new(body);
    let base = r.int()?;
    let m = r.int()?;
    r.finish()?;
    Ok(Key { base, m })
}

pub fn encode_ciphertext(c: &Ciphertext) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + c.blocks.len() * 4);
    buf.extend_from_slice(&c.len.to_le_bytes());
    buf.extend_from_slice(&(c.blocks.len() as u32).to_le_bytes());
    for block in &c.blocks {
        put_int(&mut buf, block);
    }
    buf
}

/// `max_block` is the byte width of the receiving modulus; no valid block
/// is wider.
pub fn decode_ciphertext(body: &[u8], max_block: usize) -> Result<Ciphertext, ChannelError> {
    let mut r = BodyReader::new(body);
    let len = r.u64()?;
    let count = r.u32()? as usize;
    // every block costs its 4 byte length plus at least one byte
    if count > r.remaining() / 5 {
        return Err(ChannelError::Protocol(format!("{} blocks cannot fit in {} bytes", count, r.remaining())));
    }
    let mut blocks = Vec::with_capacity(count);
    for _ in 0..count {
        blocks.push(r.bounded_int(max_block)?);
    }
    r.finish()?;
    Ok(Ciphertext { len, blocks })
}
