//! Error type for frame encoding and decoding

use std::io;
use thiserror::Error;

/// Failure while encoding or decoding a frame
///
/// Every variant is fatal for the current call. The only leniency in the
/// format (instruction length clamping) never surfaces as an error.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying byte sink or source failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A field needed more bytes than the frame body holds
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Frame tag is not one of the six variants (includes the reserved `None` tag)
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// Operand value type is not a known register/memory width
    #[error("unknown operand value type {0:#x}")]
    UnknownValueType(u32),

    /// More operands than the 4-bit count field can describe
    #[error("too many operands: {0}")]
    TooManyOperands(usize),

    /// More raw instruction bytes than the 4-bit length field can describe
    #[error("too many instruction bytes: {0}")]
    TooManyInstructionBytes(usize),

    /// Encoded frame would not fit the 16-bit size field
    ///
    /// Bodies of the built-in variants stay far below this; the check guards
    /// headers built through [`FrameHeader::for_body`](crate::FrameHeader::for_body).
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Body decode consumed a different number of bytes than the header declared
    #[error(
        "frame size mismatch: header declared {declared} body bytes, decoder consumed {consumed}"
    )]
    SizeMismatch { declared: usize, consumed: usize },

    /// Size field smaller than the header itself
    #[error("invalid frame size field {0}")]
    InvalidHeaderSize(u16),
}

impl FrameError {
    /// True when the error came from running out of input
    pub fn is_truncation(&self) -> bool {
        match self {
            FrameError::Truncated { .. } => true,
            FrameError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_classification() {
        let eof = FrameError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_truncation());
        assert!(FrameError::Truncated { needed: 4, available: 1 }.is_truncation());
        assert!(!FrameError::UnknownFrameType(9).is_truncation());
    }

    #[test]
    fn test_error_messages() {
        let err = FrameError::SizeMismatch { declared: 12, consumed: 10 };
        assert!(err.to_string().contains("declared 12"));
        assert_eq!(
            FrameError::UnknownValueType(0x16).to_string(),
            "unknown operand value type 0x16"
        );
    }
}
