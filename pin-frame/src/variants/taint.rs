//! Taint introduction event

use crate::frame::{FrameBody, FrameType};
use crate::wire::{self, BodyReader};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Marks `length` bytes starting at `addr` as newly tainted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaintFrame {
    /// Taint label
    pub id: u32,
    /// Tainted bytes starting at `addr`
    pub length: u32,
    /// First tainted address
    pub addr: u32,
}

impl TaintFrame {
    /// Tainted addresses, `addr` up to `addr + length`
    pub fn addresses(&self) -> impl Iterator<Item = u32> {
        let addr = self.addr;
        (0..self.length).map(move |i| addr.wrapping_add(i))
    }
}

impl FrameBody for TaintFrame {
    const FRAME_TYPE: FrameType = FrameType::Taint;

    fn body_size(&self) -> Result<usize> {
        Ok(12)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        wire::write_u32(out, self.id)?;
        wire::write_u32(out, self.length)?;
        wire::write_u32(out, self.addr)
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.read_u32()?,
            length: r.read_u32()?,
            addr: r.read_u32()?,
        })
    }
}
