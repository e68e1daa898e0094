//! Fixed-width per-instruction frame

use super::{check_lengths, prefix_size, read_prefix, write_column, write_prefix, Operand};
use crate::frame::{FrameBody, FrameType};
use crate::wire::BodyReader;
use crate::{CacheMask, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Operand snapshot of one executed instruction, every value in a full
/// 32-bit slot
///
/// Body layout: `addr`, `tid`, packed lengths, raw instruction bytes, cache
/// bitmap, then five `u32` arrays of `values_count` entries in the order
/// values, types, usages, locs, taint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFrame {
    /// Instruction address
    pub addr: u32,
    /// Thread id
    pub tid: u32,
    /// Instruction bytes, at most [`MAX_INSN_BYTES`](crate::MAX_INSN_BYTES)
    pub rawbytes: Vec<u8>,
    /// Operands served from the cache
    pub cachemask: CacheMask,
    /// Operands, each stored as a 32-bit value
    pub operands: Vec<Operand<u32>>,
}

impl StdFrame {
    /// Get number of operands
    pub fn values_count(&self) -> usize {
        self.operands.len()
    }

    /// Get instruction length in bytes
    pub fn insn_length(&self) -> usize {
        self.rawbytes.len()
    }
}

impl FrameBody for StdFrame {
    const FRAME_TYPE: FrameType = FrameType::Std;

    fn body_size(&self) -> Result<usize> {
        check_lengths(&self.rawbytes, self.values_count())?;
        Ok(prefix_size(self.insn_length(), self.values_count()) + self.values_count() * 4 * 5)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let ops = &self.operands;
        write_prefix(out, self.addr, self.tid, &self.rawbytes, &self.cachemask, ops.len())?;
        write_column(out, ops, |op| op.value)?;
        write_column(out, ops, |op| op.ty)?;
        write_column(out, ops, |op| op.usage)?;
        write_column(out, ops, |op| op.loc)?;
        write_column(out, ops, |op| op.taint)
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        let prefix = read_prefix(r)?;
        let n = prefix.values_count;

        let values = r.read_u32_array(n)?;
        let types = r.read_u32_array(n)?;
        let usages = r.read_u32_array(n)?;
        let locs = r.read_u32_array(n)?;
        let taint = r.read_u32_array(n)?;

        let operands = (0..n)
            .map(|i| Operand {
                value: values[i],
                ty: types[i],
                usage: usages[i],
                loc: locs[i],
                taint: taint[i],
            })
            .collect();

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
    use crate::{Frame, FrameError, ValueType};

    fn frame_with(values_count: usize, insn_length: usize) -> StdFrame {
        let operands = (0..values_count as u32)
            .map(|i| Operand::new(0x1000 + i, ValueType::Mem32, i % 3, 0xbfff_0000 + 4 * i, i))
            .collect();
        let mut cachemask = CacheMask::new();
        if values_count > 0 {
            cachemask.set_cached(values_count - 1);
        }
        StdFrame {
            addr: 0x0804_9abc,
            tid: 42,
            rawbytes: (0..insn_length as u8).map(|b| b.wrapping_mul(17)).collect(),
            cachemask,
            operands,
        }
    }

    #[test]
    fn test_body_size_formula() {
        let f = frame_with(3, 2);
        // 9 + insn_length + packed_bytes(3) + 3 * 4 * 5
        assert_eq!(f.body_size().unwrap(), 9 + 2 + 1 + 60);
        assert_eq!(frame_with(0, 0).body_size().unwrap(), 9);
        assert_eq!(frame_with(15, 15).body_size().unwrap(), 9 + 15 + 2 + 300);
    }

    #[test]
    fn test_round_trip_boundaries() {
        for (count, len) in [(0, 0), (1, 0), (1, 15), (15, 0), (15, 15), (9, 7)] {
            let frame = Frame::from(frame_with(count, len));
            let bytes = frame.to_bytes().unwrap();
            assert_eq!(bytes.len(), 3 + frame.body_size().unwrap());
            let decoded = Frame::read_from(&mut bytes.as_slice(), crate::DecodeMode::Full).unwrap();
            assert_eq!(decoded, Some(frame), "values_count={} insn_length={}", count, len);
        }
    }

    #[test]
    fn test_array_order_on_wire() {
        let frame = StdFrame {
            addr: 1,
            tid: 2,
            rawbytes: vec![],
            cachemask: CacheMask::new(),
            operands: vec![Operand { value: 10, ty: 11, usage: 12, loc: 13, taint: 14 }],
        };
        let mut body = Vec::new();
        frame.write_body(&mut body).unwrap();

        // 9-byte prefix, 1 bitmap byte, then one u32 per array
        let arrays: Vec<u32> = body[10..]
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(arrays, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_types_are_not_validated() {
        let mut frame = frame_with(1, 1);
        frame.operands[0].ty = 0x77;
        let bytes = Frame::from(frame.clone()).to_bytes().unwrap();
        let decoded = Frame::read_from(&mut bytes.as_slice(), crate::DecodeMode::Full).unwrap();
        assert_eq!(decoded, Some(Frame::Std(frame)));
    }

    #[test]
    fn test_oversized_fields_are_rejected() {
        let mut frame = frame_with(16, 1);
        assert!(matches!(frame.body_size(), Err(FrameError::TooManyOperands(16))));

        frame = frame_with(1, 16);
        let mut out = Vec::new();
        assert!(matches!(
            Frame::from(frame).write_to(&mut out),
            Err(FrameError::TooManyInstructionBytes(16))
        ));
        assert!(out.is_empty(), "nothing may be written for an invalid frame");
    }
}
