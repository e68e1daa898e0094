//! Little-endian field primitives shared by every frame body

use crate::{FrameError, Result};
use std::io::Write;

/// Cursor over one frame body that has already been read into memory
#[derive(Debug)]
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    /// Create a reader at the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FrameError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// `count` consecutive `u32` slots
    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>> {
        (0..count).map(|_| self.read_u32()).collect()
    }

    /// Little-endian integer stored in `width` bytes (at most 16)
    pub fn read_uint(&mut self, width: usize) -> Result<u128> {
        debug_assert!(width <= 16);
        let mut full = [0u8; 16];
        full[..width].copy_from_slice(self.read_bytes(width)?);
        Ok(u128::from_le_bytes(full))
    }
}

pub(crate) fn write_u8<W: Write + ?Sized>(out: &mut W, v: u8) -> Result<()> {
    out.write_all(&[v])?;
    Ok(())
}

pub(crate) fn write_u16<W: Write + ?Sized>(out: &mut W, v: u16) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u32<W: Write + ?Sized>(out: &mut W, v: u32) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write + ?Sized>(out: &mut W, v: u64) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Low `width` bytes of `v`, little-endian
pub(crate) fn write_uint<W: Write + ?Sized>(out: &mut W, v: u128, width: usize) -> Result<()> {
    debug_assert!(width <= 16);
    out.write_all(&v.to_le_bytes()[..width])?;
    Ok(())
}
