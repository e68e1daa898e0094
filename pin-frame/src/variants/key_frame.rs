//! Periodic full register checkpoint

use crate::frame::{FrameBody, FrameType};
use crate::wire::{self, BodyReader};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Body bytes: `pos` (8) + nine 32-bit registers (36) + six segment registers (12)
pub const KEY_FRAME_BODY_SIZE: usize = 56;

/// Register-file snapshot that lets a reader resynchronize without
/// replaying the trace from its start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyFrame {
    /// Number of frames preceding this checkpoint
    pub pos: u64,

    /// EAX
    pub eax: u32,
    /// EBX
    pub ebx: u32,
    /// ECX
    pub ecx: u32,
    /// EDX
    pub edx: u32,
    /// ESI
    pub esi: u32,
    /// EDI
    pub edi: u32,
    /// ESP
    pub esp: u32,
    /// EBP
    pub ebp: u32,
    /// EFLAGS
    pub eflags: u32,

    /// CS selector
    pub cs: u16,
    /// DS selector
    pub ds: u16,
    /// SS selector
    pub ss: u16,
    /// ES selector
    pub es: u16,
    /// FS selector
    pub fs: u16,
    /// GS selector
    pub gs: u16,
}

impl KeyFrame {
    /// Set every register at once
    ///
    /// `gprs` is eax, ebx, ecx, edx, esi, edi, esp, ebp; `segs` is cs, ds,
    /// ss, es, fs, gs.
    pub fn set_registers(&mut self, gprs: [u32; 8], eflags: u32, segs: [u16; 6]) {
        let [eax, ebx, ecx, edx, esi, edi, esp, ebp] = gprs;
        let [cs, ds, ss, es, fs, gs] = segs;
        *self = Self {
            pos: self.pos,
            eax,
            ebx,
            ecx,
            edx,
            esi,
            edi,
            esp,
            ebp,
            eflags,
            cs,
            ds,
            ss,
            es,
            fs,
            gs,
        };
    }

    /// General registers in wire order
    pub fn gprs(&self) -> [u32; 8] {
        [self.eax, self.ebx, self.ecx, self.edx, self.esi, self.edi, self.esp, self.ebp]
    }

    /// Segment registers in wire order
    pub fn segments(&self) -> [u16; 6] {
        [self.cs, self.ds, self.ss, self.es, self.fs, self.gs]
    }
}

impl FrameBody for KeyFrame {
    const FRAME_TYPE: FrameType = FrameType::Key;

    fn body_size(&self) -> Result<usize> {
        Ok(KEY_FRAME_BODY_SIZE)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        wire::write_u64(out, self.pos)?;
        for reg in self.gprs() {
            wire::write_u32(out, reg)?;
        }
        wire::write_u32(out, self.eflags)?;
        for seg in self.segments() {
            wire::write_u16(out, seg)?;
        }
        Ok(())
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        let mut frame = KeyFrame {
            pos: r.read_u64()?,
            ..KeyFrame::default()
        };
        let mut gprs = [0u32; 8];
        for reg in gprs.iter_mut() {
            *reg = r.read_u32()?;
        }
        let eflags = r.read_u32()?;
        let mut segs = [0u16; 6];
        for seg in segs.iter_mut() {
            *seg = r.read_u16()?;
        }
        frame.set_registers(gprs, eflags, segs);
        Ok(frame)
    }
}
