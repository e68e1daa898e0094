//! System call event

use crate::frame::{FrameBody, FrameType};
use crate::wire::{self, BodyReader};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Argument slots carried by every syscall frame
pub const MAX_SYSCALL_ARGS: usize = 9;

/// A system call issued at `addr` by thread `tid`
///
/// All [`MAX_SYSCALL_ARGS`] slots are written whatever the call's real arity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyscallFrame {
    /// Address of the trapping instruction
    pub addr: u32,
    /// Thread id
    pub tid: u32,
    /// System call number
    pub callno: u32,
    /// Argument registers, unused slots zero
    pub args: [u32; MAX_SYSCALL_ARGS],
}

impl FrameBody for SyscallFrame {
    const FRAME_TYPE: FrameType = FrameType::Syscall;

    fn body_size(&self) -> Result<usize> {
        Ok(12 + 4 * MAX_SYSCALL_ARGS)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        wire::write_u32(out, self.addr)?;
        wire::write_u32(out, self.tid)?;
        wire::write_u32(out, self.callno)?;
        for arg in self.args {
            wire::write_u32(out, arg)?;
        }
        Ok(())
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        let addr = r.read_u32()?;
        let tid = r.read_u32()?;
        let callno = r.read_u32()?;
        let mut args = [0u32; MAX_SYSCALL_ARGS];
        for arg in args.iter_mut() {
            *arg = r.read_u32()?;
        }
        Ok(Self {
            addr,
            tid,
            callno,
            args,
        })
    }
}
