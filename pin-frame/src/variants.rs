//! Frame variants
//!
//! Each variant owns its field set and implements [`FrameBody`](crate::FrameBody)
//! for its own byte layout. The two per-instruction variants share the
//! instruction prefix handled in this module.

use crate::cache_mask::{packed_bytes, CacheMask};
use crate::wire::{self, BodyReader};
use crate::{FrameError, Result, ValueType};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub mod key_frame;
pub mod load_module;
pub mod std_frame;
pub mod std_frame2;
pub mod syscall;
pub mod taint;

pub use key_frame::KeyFrame;
pub use load_module::{LoadModuleFrame, MODULE_NAME_LEN};
pub use std_frame::StdFrame;
pub use std_frame2::StdFrame2;
pub use syscall::{SyscallFrame, MAX_SYSCALL_ARGS};
pub use taint::TaintFrame;

/// Most raw instruction bytes a frame can carry (4-bit field)
pub const MAX_INSN_BYTES: usize = 15;

/// Most operands a frame can carry (4-bit field)
pub const MAX_VALUES_COUNT: usize = 15;

/// One recorded operand of an instruction
///
/// `V` is the in-memory value type: `u32` for [`StdFrame`], `u128` for
/// [`StdFrame2`]. `ty` is the raw value-type tag as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand<V> {
    /// Recorded value
    pub value: V,
    /// Raw value-type tag
    pub ty: u32,
    /// Read/write usage flags, opaque to the codec
    pub usage: u32,
    /// Register id or memory address
    pub loc: u32,
    /// Taint label, opaque to the codec
    pub taint: u32,
}

impl<V> Operand<V> {
    /// Create an operand of a known value type
    pub fn new(value: V, ty: ValueType, usage: u32, loc: u32, taint: u32) -> Self {
        Self {
            value,
            ty: ty.tag(),
            usage,
            loc,
            taint,
        }
    }

    /// Parsed value type, failing on tags outside the known set
    pub fn value_type(&self) -> Result<ValueType> {
        ValueType::try_from(self.ty)
    }
}

/// Bound a decoded instruction length to [`MAX_INSN_BYTES`]
///
/// Out-of-range lengths are tolerated rather than rejected.
pub fn clamp_insn_length(len: usize) -> usize {
    if len > MAX_INSN_BYTES {
        tracing::warn!("Instruction length {} exceeds {}, clamping", len, MAX_INSN_BYTES);
        MAX_INSN_BYTES
    } else {
        len
    }
}

/// `|7654|3210|` = `|insn_length|values_count|`
pub(crate) fn pack_lengths(values_count: usize, insn_length: usize) -> u8 {
    ((values_count & 0xf) | ((insn_length & 0xf) << 4)) as u8
}

/// Inverse of [`pack_lengths`]: `(values_count, insn_length)`
pub(crate) fn unpack_lengths(packed: u8) -> (usize, usize) {
    (usize::from(packed & 0xf), usize::from(packed >> 4))
}

/// Fields shared by the per-instruction variants, as they precede the operand arrays
#[derive(Debug)]
pub(crate) struct InsnPrefix {
    /// Instruction address
    pub addr: u32,
    /// Thread id
    pub tid: u32,
    /// Instruction bytes
    pub rawbytes: Vec<u8>,
    /// Cached-operand bitmap
    pub cachemask: CacheMask,
    /// Operands that follow the prefix
    pub values_count: usize,
}

/// Reject counts that do not fit their 4-bit fields
pub(crate) fn check_lengths(rawbytes: &[u8], values_count: usize) -> Result<()> {
    if rawbytes.len() > MAX_INSN_BYTES {
        return Err(FrameError::TooManyInstructionBytes(rawbytes.len()));
    }
    if values_count > MAX_VALUES_COUNT {
        return Err(FrameError::TooManyOperands(values_count));
    }
    Ok(())
}

/// addr + tid + packed lengths + raw bytes + cache bitmap
pub(crate) fn prefix_size(insn_length: usize, values_count: usize) -> usize {
    4 + 4 + 1 + insn_length + packed_bytes(values_count)
}

pub(crate) fn write_prefix<W: Write + ?Sized>(
    out: &mut W,
    addr: u32,
    tid: u32,
    rawbytes: &[u8],
    cachemask: &CacheMask,
    values_count: usize,
) -> Result<()> {
    wire::write_u32(out, addr)?;
    wire::write_u32(out, tid)?;
    wire::write_u8(out, pack_lengths(values_count, rawbytes.len()))?;
    out.write_all(rawbytes)?;
    out.write_all(cachemask.packed(values_count))?;
    Ok(())
}

pub(crate) fn read_prefix(r: &mut BodyReader<'_>) -> Result<InsnPrefix> {
    let addr = r.read_u32()?;
    let tid = r.read_u32()?;
    let (values_count, insn_length) = unpack_lengths(r.read_u8()?);
    let insn_length = clamp_insn_length(insn_length);
    let rawbytes = r.read_bytes(insn_length)?.to_vec();
    let cachemask = CacheMask::from_packed(r.read_bytes(packed_bytes(values_count))?);
    Ok(InsnPrefix {
        addr,
        tid,
        rawbytes,
        cachemask,
        values_count,
    })
}

/// Write one `u32` field of every operand as a contiguous array
pub(crate) fn write_column<V, W: Write + ?Sized>(
    out: &mut W,
    operands: &[Operand<V>],
    field: impl Fn(&Operand<V>) -> u32,
) -> Result<()> {
    for op in operands {
        wire::write_u32(out, field(op))?;
    }
    Ok(())
}
