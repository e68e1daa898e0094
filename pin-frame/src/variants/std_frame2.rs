//! Size-optimized per-instruction frame
//!
//! Operand values are stored using only as many bytes as their value type
//! needs. Because a value's width is only known from its type, the four
//! fixed-width arrays go first and the values follow in a second pass.

use super::{check_lengths, prefix_size, read_prefix, write_column, write_prefix, Operand};
use crate::frame::{FrameBody, FrameType};
use crate::value_type::bytes_of_type;
use crate::wire::{self, BodyReader};
use crate::{CacheMask, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Operand snapshot of one executed instruction with variable-width values
///
/// Body layout: `addr`, `tid`, packed lengths, raw instruction bytes, cache
/// bitmap, four `u32` arrays (types, usages, locs, taint), then each value in
/// `bytes_of_type(types[i])` little-endian bytes with no padding.
///
/// Bits of `value` above its type's width are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFrame2 {
    /// Instruction address
    pub addr: u32,
    /// Thread id
    pub tid: u32,
    /// Instruction bytes, at most [`MAX_INSN_BYTES`](crate::MAX_INSN_BYTES)
    pub rawbytes: Vec<u8>,
    /// Operands served from the cache
    pub cachemask: CacheMask,
    /// Operands, each stored at its value type's width
    pub operands: Vec<Operand<u128>>,
}

impl StdFrame2 {
    /// Get number of operands
    pub fn values_count(&self) -> usize {
        self.operands.len()
    }

    /// Get instruction length in bytes
    pub fn insn_length(&self) -> usize {
        self.rawbytes.len()
    }

    /// Byte width of every operand value, in operand order
    pub fn value_widths(&self) -> Result<Vec<usize>> {
        self.operands.iter().map(|op| bytes_of_type(op.ty)).collect()
    }
}

impl FrameBody for StdFrame2 {
    const FRAME_TYPE: FrameType = FrameType::Std2;

    fn body_size(&self) -> Result<usize> {
        check_lengths(&self.rawbytes, self.values_count())?;
        let payload: usize = self.value_widths()?.iter().sum();
        let columns = self.values_count() * 4 * 4;
        Ok(prefix_size(self.insn_length(), self.values_count()) + columns + payload)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let ops = &self.operands;
        let widths = self.value_widths()?;

        write_prefix(out, self.addr, self.tid, &self.rawbytes, &self.cachemask, ops.len())?;
        write_column(out, ops, |op| op.ty)?;
        write_column(out, ops, |op| op.usage)?;
        write_column(out, ops, |op| op.loc)?;
        write_column(out, ops, |op| op.taint)?;

        for (op, width) in ops.iter().zip(widths) {
            wire::write_uint(out, op.value, width)?;
        }
        Ok(())
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        let prefix = read_prefix(r)?;
        let n = prefix.values_count;

        let types = r.read_u32_array(n)?;
        let usages = r.read_u32_array(n)?;
        let locs = r.read_u32_array(n)?;
        let taint = r.read_u32_array(n)?;

        let mut operands = Vec::with_capacity(n);
        for i in 0..n {
            let value = r.read_uint(bytes_of_type(types[i])?)?;
            operands.push(Operand {
                value,
                ty: types[i],
                usage: usages[i],
                loc: locs[i],
                taint: taint[i],
            });
        }

        Ok(Self {
            addr: prefix.addr,
            tid: prefix.tid,
            rawbytes: prefix.rawbytes,
            cachemask: prefix.cachemask,
            operands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecodeMode, Frame, FrameError, ValueType};

    fn mixed_frame() -> StdFrame2 {
        StdFrame2 {
            addr: 0x0804_8123,
            tid: 5,
            rawbytes: vec![0x8b, 0x45, 0xfc],
            cachemask: CacheMask::new(),
            operands: vec![
                Operand::new(0xab, ValueType::Reg8, 1, 3, 0),
                Operand::new(0x1122_3344, ValueType::Mem32, 1, 0xbfff_fff0, 7),
                Operand::new(0x0102_0304_0506_0708, ValueType::Reg64, 2, 9, 0),
            ],
        }
    }

    #[test]
    fn test_value_payload_follows_fixed_arrays() {
        let frame = mixed_frame();
        let mut body = Vec::new();
        frame.write_body(&mut body).unwrap();

        let fixed_end = 9 + 3 + 1 + 3 * 4 * 4;
        let payload = &body[fixed_end..];
        assert_eq!(payload.len(), 1 + 4 + 8);
        assert_eq!(payload[0], 0xab);
        assert_eq!(&payload[1..5], &0x1122_3344u32.to_le_bytes());
        assert_eq!(&payload[5..], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(body.len(), frame.body_size().unwrap());
    }

    #[test]
    fn test_round_trip_all_widths() {
        let operands = vec![
            Operand::new(0x7f, ValueType::Mem8, 0, 0x100, 0),
            Operand::new(0xbeef, ValueType::Reg16, 1, 1, 1),
            Operand::new(0xdead_beef, ValueType::Reg32, 2, 2, 2),
            Operand::new(u64::MAX as u128, ValueType::Mem64, 3, 0x200, 3),
            Operand::new(u128::MAX - 1, ValueType::Reg128, 4, 4, 4),
        ];
        let mut cachemask = CacheMask::new();
        cachemask.set_cached(1);
        cachemask.set_cached(4);
        let frame = Frame::from(StdFrame2 {
            addr: 1,
            tid: 2,
            rawbytes: vec![0x0f; 15],
            cachemask,
            operands,
        });

        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes.len(), 3 + 9 + 15 + 1 + 5 * 16 + (1 + 2 + 4 + 8 + 16));
        let decoded = Frame::read_from(&mut bytes.as_slice(), DecodeMode::Full).unwrap();
        assert_eq!(decoded, Some(frame));
    }

    #[test]
    fn test_round_trip_empty_and_full() {
        let empty = Frame::from(StdFrame2::default());
        let bytes = empty.to_bytes().unwrap();
        assert_eq!(bytes.len(), 3 + 9);
        assert_eq!(Frame::read_from(&mut bytes.as_slice(), DecodeMode::Full).unwrap(), Some(empty));

        let full = Frame::from(StdFrame2 {
            operands: (0..15u32)
                .map(|i| Operand::new(u128::from(i), ValueType::Reg16, 0, i, 0))
                .collect(),
            ..StdFrame2::default()
        });
        let bytes = full.to_bytes().unwrap();
        assert_eq!(Frame::read_from(&mut bytes.as_slice(), DecodeMode::Full).unwrap(), Some(full));
    }

    #[test]
    fn test_unknown_type_fails_before_writing() {
        let mut frame = mixed_frame();
        frame.operands[1].ty = 0x42;
        let mut out = Vec::new();
        assert!(matches!(
            Frame::from(frame).write_to(&mut out),
            Err(FrameError::UnknownValueType(0x42))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_type_on_decode_is_fatal() {
        let frame = mixed_frame();
        let mut bytes = Frame::from(frame).to_bytes().unwrap();
        // first entry of the types array: header + 9-byte prefix + 3 raw bytes + 1 bitmap byte
        let types_at = 3 + 9 + 3 + 1;
        bytes[types_at..types_at + 4].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            Frame::read_from(&mut bytes.as_slice(), DecodeMode::Full),
            Err(FrameError::UnknownValueType(0))
        ));
    }

    #[test]
    fn test_high_bits_beyond_width_are_dropped() {
        let frame = StdFrame2 {
            operands: vec![Operand::new(0x1ff, ValueType::Reg8, 0, 0, 0)],
            ..StdFrame2::default()
        };
        let bytes = Frame::from(frame).to_bytes().unwrap();
        match Frame::read_from(&mut bytes.as_slice(), DecodeMode::Full).unwrap() {
            Some(Frame::Std2(decoded)) => assert_eq!(decoded.operands[0].value, 0xff),
            other => panic!("unexpected {:?}", other),
        }
    }
}
