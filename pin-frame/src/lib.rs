//! Pin Frame - Binary wire format for per-instruction execution traces
//!
//! This crate encodes and decodes the frames an instrumentation agent emits
//! while a monitored program runs, and that offline analysis tools read back.
//!
//! # Overview
//!
//! A trace is a flat sequence of frames. Each frame carries a 1-byte type tag
//! and a 2-byte total size, followed by a variant-specific body:
//!
//! * [`StdFrame`] / [`StdFrame2`] - operand values, types, usages, locations
//!   and taint of one executed instruction (fixed-width and size-optimized)
//! * [`KeyFrame`] - periodic full register checkpoint
//! * [`LoadModuleFrame`] - a module mapped into the process
//! * [`SyscallFrame`] - a system call and its arguments
//! * [`TaintFrame`] - a byte range newly marked as tainted
//!
//! All integers are little-endian. Because the size field covers the whole
//! frame, readers can skip frames they do not care about without decoding
//! them ([`DecodeMode::Skip`]).
//!
//! # Usage
//!
//! ```
//! use pin_frame::{Frame, FrameReader, FrameWriter, TaintFrame};
//!
//! let mut writer = FrameWriter::new(Vec::new());
//! writer.write_frame(&TaintFrame { id: 1, length: 4, addr: 0x1000 }.into()).unwrap();
//!
//! let bytes = writer.into_inner();
//! let frames: Vec<Frame> = FrameReader::new(bytes.as_slice())
//!     .collect::<pin_frame::Result<_>>()
//!     .unwrap();
//! assert_eq!(frames.len(), 1);
//! ```
//!
//! # Features
//!
//! * `operands` - projects decoded frames into named concrete operand bindings

pub mod cache_mask;
pub mod error;
pub mod frame;
#[cfg(feature = "operands")]
pub mod operands;
pub mod stream;
pub mod value_type;
pub mod variants;
pub mod wire;

pub use cache_mask::{packed_bytes, CacheMask, MAX_CACHEMASK_BYTES};
pub use error::FrameError;
pub use frame::{DecodeMode, Frame, FrameBody, FrameHeader, FrameType, FRAME_HEADER_SIZE, FRM_NONE};
#[cfg(feature = "operands")]
pub use operands::{ConcreteOperand, RegisterNames, TaintSource};
pub use stream::{FrameReader, FrameWriter, ReaderConfig};
pub use value_type::{bits_of_type, bytes_of_type, ValueType, VT_NONE};
pub use variants::{
    clamp_insn_length, KeyFrame, LoadModuleFrame, Operand, StdFrame, StdFrame2, SyscallFrame,
    TaintFrame, MAX_INSN_BYTES, MAX_SYSCALL_ARGS, MAX_VALUES_COUNT, MODULE_NAME_LEN,
};

/// Result type for frame operations
pub type Result<T> = std::result::Result<T, FrameError>;
