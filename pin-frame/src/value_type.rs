//! Operand value types and their widths

use crate::{FrameError, Result};
use serde::{Deserialize, Serialize};

/// Kind and width of a recorded operand
///
/// The discriminant is the tag stored in an operand's `types` slot.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Reg32 = 0x01,
    Reg16 = 0x02,
    Reg8 = 0x03,
    Reg64 = 0x04,
    Reg128 = 0x05,
    Mem32 = 0x11,
    Mem16 = 0x12,
    Mem8 = 0x13,
    Mem64 = 0x14,
    Mem128 = 0x15,
}

/// Reserved "no type" tag, never valid for a recorded operand
pub const VT_NONE: u32 = 0;

impl ValueType {
    /// Width of the operand in bits
    pub fn bits(self) -> u32 {
        match self {
            ValueType::Reg8 | ValueType::Mem8 => 8,
            ValueType::Reg16 | ValueType::Mem16 => 16,
            ValueType::Reg32 | ValueType::Mem32 => 32,
            ValueType::Reg64 | ValueType::Mem64 => 64,
            ValueType::Reg128 | ValueType::Mem128 => 128,
        }
    }

    /// Width of the operand in bytes
    pub fn bytes(self) -> usize {
        let bits = self.bits();
        debug_assert_eq!(bits % 8, 0);
        (bits / 8) as usize
    }

    /// True for memory operands, false for registers
    pub fn is_mem(self) -> bool {
        matches!(
            self,
            ValueType::Mem8
                | ValueType::Mem16
                | ValueType::Mem32
                | ValueType::Mem64
                | ValueType::Mem128
        )
    }

    /// Raw wire tag
    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ValueType {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0x01 => Ok(ValueType::Reg32),
            0x02 => Ok(ValueType::Reg16),
            0x03 => Ok(ValueType::Reg8),
            0x04 => Ok(ValueType::Reg64),
            0x05 => Ok(ValueType::Reg128),
            0x11 => Ok(ValueType::Mem32),
            0x12 => Ok(ValueType::Mem16),
            0x13 => Ok(ValueType::Mem8),
            0x14 => Ok(ValueType::Mem64),
            0x15 => Ok(ValueType::Mem128),
            other => Err(FrameError::UnknownValueType(other)),
        }
    }
}

/// Bit width of a raw type tag
pub fn bits_of_type(tag: u32) -> Result<u32> {
    ValueType::try_from(tag).map(ValueType::bits)
}

/// Byte width of a raw type tag
pub fn bytes_of_type(tag: u32) -> Result<usize> {
    ValueType::try_from(tag).map(ValueType::bytes)
}
