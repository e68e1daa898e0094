//! Concrete operand bindings projected from decoded frames
//!
//! Only built with the `operands` feature. The projection is read-only: it
//! never changes a frame and needs nothing beyond its decoded fields plus a
//! register-name lookup supplied by the caller.

use crate::variants::{StdFrame, StdFrame2, SyscallFrame, TaintFrame};
use crate::{Frame, Result, ValueType};
use serde::{Deserialize, Serialize};

/// Name given to every memory operand
pub const MEM_OPERAND_NAME: &str = "mem";

/// Resolves recorder register ids to names
pub trait RegisterNames {
    fn register_name(&self, loc: u32) -> String;
}

impl<F: Fn(u32) -> String> RegisterNames for F {
    fn register_name(&self, loc: u32) -> String {
        self(loc)
    }
}

/// Hands out fresh taint ids for bytes introduced by syscalls and taint frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintSource {
    next: u32,
}

impl Default for TaintSource {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl TaintSource {
    /// Create a source whose first id is 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next taint id
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// One operand bound to a name and concrete value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteOperand {
    /// Register name, or the memory placeholder
    pub name: String,
    /// True for memory operands
    pub is_mem: bool,
    /// Operand width and kind
    pub ty: ValueType,
    /// Memory address for memory operands, zero for registers
    pub index: u64,
    /// Recorded value, truncated to 64 bits
    pub value: u64,
    /// Read/write usage flags
    pub usage: u32,
    /// Taint label
    pub taint: u32,
}

fn bind(
    names: &dyn RegisterNames,
    ty: ValueType,
    loc: u32,
    value: u64,
    usage: u32,
    taint: u32,
) -> ConcreteOperand {
    let is_mem = ty.is_mem();
    ConcreteOperand {
        name: if is_mem {
            MEM_OPERAND_NAME.to_string()
        } else {
            names.register_name(loc)
        },
        is_mem,
        ty,
        index: if is_mem { u64::from(loc) } else { 0 },
        value,
        usage,
        taint,
    }
}

fn fresh_mem_byte(index: u64, taint: u32) -> ConcreteOperand {
    ConcreteOperand {
        name: MEM_OPERAND_NAME.to_string(),
        is_mem: true,
        ty: ValueType::Mem8,
        index,
        value: 0,
        usage: 0,
        taint,
    }
}

impl StdFrame {
    /// Every operand; an unknown value type is an error
    pub fn operand_bindings(&self, names: &dyn RegisterNames) -> Result<Vec<ConcreteOperand>> {
        self.operands
            .iter()
            .map(|op| {
                let ty = op.value_type()?;
                Ok(bind(names, ty, op.loc, u64::from(op.value), op.usage, op.taint))
            })
            .collect()
    }
}

impl StdFrame2 {
    /// Operands of known type; values wider than 64 bits bind as all ones
    pub fn operand_bindings(&self, names: &dyn RegisterNames) -> Vec<ConcreteOperand> {
        self.operands
            .iter()
            .filter_map(|op| {
                let ty = op.value_type().ok()?;
                let bytes = ty.bytes();
                let value = if bytes > 8 {
                    u64::MAX
                } else {
                    (op.value & ((1u128 << (bytes * 8)) - 1)) as u64
                };
                Some(bind(names, ty, op.loc, value, op.usage, op.taint))
            })
            .collect()
    }
}

impl SyscallFrame {
    /// One fresh byte per unit of `callno`, starting at the second argument
    pub fn operand_bindings(&self, source: &mut TaintSource) -> Vec<ConcreteOperand> {
        let base = u64::from(self.args[1]);
        (0..u64::from(self.callno))
            .map(|i| fresh_mem_byte(base + i, source.next_id()))
            .collect()
    }
}

impl TaintFrame {
    /// One fresh byte per tainted address
    pub fn operand_bindings(&self, source: &mut TaintSource) -> Vec<ConcreteOperand> {
        let base = u64::from(self.addr);
        (0..u64::from(self.length))
            .map(|i| fresh_mem_byte(base + i, source.next_id()))
            .collect()
    }
}

impl Frame {
    /// Bindings for frame kinds that carry operands; checkpoints and module
    /// loads have none
    pub fn operand_bindings(
        &self,
        names: &dyn RegisterNames,
        source: &mut TaintSource,
    ) -> Result<Vec<ConcreteOperand>> {
        match self {
            Frame::Std(f) => f.operand_bindings(names),
            Frame::Std2(f) => Ok(f.operand_bindings(names)),
            Frame::Syscall(f) => Ok(f.operand_bindings(source)),
            Frame::Taint(f) => Ok(f.operand_bindings(source)),
            Frame::Key(_) | Frame::LoadModule(_) => Ok(Vec::new()),
        }
    }
}
