//! Frame header codec and variant dispatch
//!
//! Every frame starts with the same 3-byte preamble:
//!
//! ```text
//! +------+-----------+------------------+
//! | tag  | size (LE) | body             |
//! | 1 B  | 2 B       | size - 3 bytes   |
//! +------+-----------+------------------+
//! ```
//!
//! `size` counts the preamble itself, so a reader that is not interested in a
//! frame can always step over it without understanding the body.

use crate::variants::{KeyFrame, LoadModuleFrame, StdFrame, StdFrame2, SyscallFrame, TaintFrame};
use crate::wire::{self, BodyReader};
use crate::{FrameError, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Bytes taken by the tag and size fields
pub const FRAME_HEADER_SIZE: usize = 3;

/// Reserved tag that never appears on the wire
pub const FRM_NONE: u8 = 0;

/// Stable wire tag of each frame variant
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrameType {
    Std = 1,
    Key = 2,
    LoadModule = 3,
    Syscall = 4,
    Taint = 5,
    Std2 = 6,
}

impl FrameType {
    /// Wire tag byte
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Std),
            2 => Ok(FrameType::Key),
            3 => Ok(FrameType::LoadModule),
            4 => Ok(FrameType::Syscall),
            5 => Ok(FrameType::Taint),
            6 => Ok(FrameType::Std2),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Whether a decode call materializes the frame or only steps over it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecodeMode {
    /// Build the frame value
    #[default]
    Full,
    /// Advance past the body and yield nothing
    Skip,
}

/// Body layout of one frame variant
///
/// The header codec asks the variant for its body size, writes the preamble
/// and then lets the variant append exactly that many bytes.
pub trait FrameBody: Sized {
    /// Tag written in front of this variant
    const FRAME_TYPE: FrameType;

    /// Number of body bytes `write_body` will produce
    fn body_size(&self) -> Result<usize>;

    /// Append the body to `out`
    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()>;

    /// Populate a fresh value from a body that has already been read
    fn read_body(r: &mut BodyReader<'_>) -> Result<Self>;
}

/// The common preamble of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Raw tag byte, possibly unknown to this decoder
    pub tag: u8,
    /// Total on-wire length including the preamble
    pub size: u16,
}

impl FrameHeader {
    /// Header for a body of `body_size` bytes; adds the preamble's own length
    pub fn for_body(frame_type: FrameType, body_size: usize) -> Result<Self> {
        let total = body_size + FRAME_HEADER_SIZE;
        let size = u16::try_from(total).map_err(|_| FrameError::FrameTooLarge(total))?;
        Ok(Self {
            tag: frame_type.tag(),
            size,
        })
    }

    /// Known frame type for the tag, `None` for unassigned tags
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.tag).ok()
    }

    /// Bytes that follow the preamble; zero for a size field below the preamble
    pub fn body_len(&self) -> usize {
        usize::from(self.size).saturating_sub(FRAME_HEADER_SIZE)
    }

    fn check_size(&self) -> Result<()> {
        if usize::from(self.size) < FRAME_HEADER_SIZE {
            return Err(FrameError::InvalidHeaderSize(self.size));
        }
        Ok(())
    }

    /// Write the tag byte and the little-endian size field
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        wire::write_u8(out, self.tag)?;
        wire::write_u16(out, self.size)
    }

    /// Read a preamble; EOF before its first byte yields `Ok(None)`
    pub fn try_read_from<R: Read + ?Sized>(input: &mut R) -> Result<Option<Self>> {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        let mut filled = 0;
        while filled < FRAME_HEADER_SIZE {
            match input.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            FRAME_HEADER_SIZE => Self::from_bytes(buf).map(Some),
            available => Err(FrameError::Truncated {
                needed: FRAME_HEADER_SIZE,
                available,
            }),
        }
    }

    /// Read a preamble; EOF anywhere is a truncation
    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        Self::try_read_from(input)?.ok_or(FrameError::Truncated {
            needed: FRAME_HEADER_SIZE,
            available: 0,
        })
    }

    fn from_bytes(buf: [u8; FRAME_HEADER_SIZE]) -> Result<Self> {
        let header = Self {
            tag: buf[0],
            size: u16::from_le_bytes([buf[1], buf[2]]),
        };
        header.check_size()?;
        Ok(header)
    }

    /// Advance `input` past this frame's body without looking at it
    pub fn skip_body<R: Read + ?Sized>(&self, input: &mut R) -> Result<()> {
        self.check_size()?;
        let want = self.body_len() as u64;
        let skipped = io::copy(&mut input.take(want), &mut io::sink())?;
        if skipped < want {
            return Err(FrameError::Truncated {
                needed: self.body_len(),
                available: skipped as usize,
            });
        }
        tracing::trace!("Skipped frame tag={} size={}", self.tag, self.size);
        Ok(())
    }

    /// Read exactly this frame's body into memory
    pub fn read_body_bytes<R: Read + ?Sized>(&self, input: &mut R) -> Result<Vec<u8>> {
        self.check_size()?;
        let mut body = Vec::with_capacity(self.body_len());
        let got = input.take(self.body_len() as u64).read_to_end(&mut body)?;
        if got < self.body_len() {
            return Err(FrameError::Truncated {
                needed: self.body_len(),
                available: got,
            });
        }
        Ok(body)
    }
}

/// One decoded or to-be-encoded trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Std(StdFrame),
    Std2(StdFrame2),
    Key(KeyFrame),
    LoadModule(LoadModuleFrame),
    Syscall(SyscallFrame),
    Taint(TaintFrame),
}

macro_rules! frame_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Frame {
                fn from(frame: $ty) -> Self {
                    Frame::$variant(frame)
                }
            }
        )*
    };
}

frame_from! {
    Std => StdFrame,
    Std2 => StdFrame2,
    Key => KeyFrame,
    LoadModule => LoadModuleFrame,
    Syscall => SyscallFrame,
    Taint => TaintFrame,
}

fn encode_with<B: FrameBody, W: Write + ?Sized>(body: &B, out: &mut W) -> Result<usize> {
    let header = FrameHeader::for_body(B::FRAME_TYPE, body.body_size()?)?;
    header.write_to(out)?;
    body.write_body(out)?;
    Ok(usize::from(header.size))
}

impl Frame {
    /// Variant of this frame
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Std(_) => FrameType::Std,
            Frame::Std2(_) => FrameType::Std2,
            Frame::Key(_) => FrameType::Key,
            Frame::LoadModule(_) => FrameType::LoadModule,
            Frame::Syscall(_) => FrameType::Syscall,
            Frame::Taint(_) => FrameType::Taint,
        }
    }

    /// Length of the body, derived from the variant's current fields
    pub fn body_size(&self) -> Result<usize> {
        match self {
            Frame::Std(f) => f.body_size(),
            Frame::Std2(f) => f.body_size(),
            Frame::Key(f) => f.body_size(),
            Frame::LoadModule(f) => f.body_size(),
            Frame::Syscall(f) => f.body_size(),
            Frame::Taint(f) => f.body_size(),
        }
    }

    /// Value the size field will carry: body plus preamble
    pub fn encoded_size(&self) -> Result<u16> {
        Ok(FrameHeader::for_body(self.frame_type(), self.body_size()?)?.size)
    }

    /// Write preamble and body, returning the number of bytes written
    ///
    /// All validation happens before the first byte is written.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize> {
        match self {
            Frame::Std(f) => encode_with(f, out),
            Frame::Std2(f) => encode_with(f, out),
            Frame::Key(f) => encode_with(f, out),
            Frame::LoadModule(f) => encode_with(f, out),
            Frame::Syscall(f) => encode_with(f, out),
            Frame::Taint(f) => encode_with(f, out),
        }
    }

    /// Encode header and body into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::from(self.encoded_size()?));
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decode or skip the next frame
    ///
    /// In [`DecodeMode::Skip`] the body is stepped over and `Ok(None)` is
    /// returned, even for tags this decoder does not know. In
    /// [`DecodeMode::Full`] the body is read, dispatched on its tag and
    /// checked to have been consumed exactly.
    pub fn read_from<R: Read + ?Sized>(input: &mut R, mode: DecodeMode) -> Result<Option<Frame>> {
        let header = FrameHeader::read_from(input)?;
        match mode {
            DecodeMode::Skip => {
                header.skip_body(input)?;
                Ok(None)
            }
            DecodeMode::Full => {
                let body = header.read_body_bytes(input)?;
                Frame::decode_body(&header, &body, true).map(Some)
            }
        }
    }

    /// Build the variant named by `header` from its already-read body
    ///
    /// With `verify_size` set, leftover body bytes are a [`FrameError::SizeMismatch`].
    pub fn decode_body(header: &FrameHeader, body: &[u8], verify_size: bool) -> Result<Frame> {
        let frame_type = FrameType::try_from(header.tag)?;
        let mut r = BodyReader::new(body);
        let frame = match frame_type {
            FrameType::Std => Frame::Std(StdFrame::read_body(&mut r)?),
            FrameType::Std2 => Frame::Std2(StdFrame2::read_body(&mut r)?),
            FrameType::Key => Frame::Key(KeyFrame::read_body(&mut r)?),
            FrameType::LoadModule => Frame::LoadModule(LoadModuleFrame::read_body(&mut r)?),
            FrameType::Syscall => Frame::Syscall(SyscallFrame::read_body(&mut r)?),
            FrameType::Taint => Frame::Taint(TaintFrame::read_body(&mut r)?),
        };
        if verify_size && r.remaining() != 0 {
            return Err(FrameError::SizeMismatch {
                declared: body.len(),
                consumed: r.consumed(),
            });
        }
        tracing::trace!("Decoded {} frame, {} bytes", frame_type, header.size);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::Operand;
    use crate::{CacheMask, ValueType};
    use std::io::Cursor;

    fn sample_std() -> StdFrame {
        StdFrame {
            addr: 0x0804_8000,
            tid: 7,
            rawbytes: vec![0x89, 0xd8],
            cachemask: CacheMask::new(),
            operands: vec![
                Operand::new(0xdead_beef, ValueType::Reg32, 1, 8, 0),
                Operand::new(0x42, ValueType::Reg32, 2, 9, 3),
            ],
        }
    }

    fn sample_frames() -> Vec<Frame> {
        let mut key = KeyFrame::default();
        key.pos = 1_000_000;
        key.set_registers(
            [1, 2, 3, 4, 5, 6, 7, 8],
            0x246,
            [0x23, 0x2b, 0x2b, 0x2b, 0x0, 0x63],
        );
        vec![
            sample_std().into(),
            StdFrame2 {
                addr: 0x1000,
                tid: 1,
                rawbytes: vec![0x90],
                cachemask: CacheMask::new(),
                operands: vec![Operand::new(0xff, ValueType::Reg8, 1, 0, 0)],
            }
            .into(),
            key.into(),
            LoadModuleFrame::with_name(0x4000_0000, 0x4010_0000, 0x4000_1000, 0, "libc.so.6")
                .into(),
            SyscallFrame {
                addr: 0x1234,
                tid: 2,
                callno: 3,
                args: [0, 4, 512, 0, 0, 0, 0, 0, 0],
            }
            .into(),
            TaintFrame { id: 1, length: 16, addr: 0xbfff_0000 }.into(),
        ]
    }

    #[test]
    fn test_frame_type_tags() {
        assert_eq!(FrameType::Std.tag(), 1);
        assert_eq!(FrameType::Std2.tag(), 6);
        assert_eq!(FrameType::try_from(3).unwrap(), FrameType::LoadModule);
        assert!(matches!(FrameType::try_from(FRM_NONE), Err(FrameError::UnknownFrameType(0))));
        assert!(matches!(FrameType::try_from(7), Err(FrameError::UnknownFrameType(7))));
    }

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        FrameHeader::for_body(FrameType::Taint, 12).unwrap().write_to(&mut out).unwrap();
        assert_eq!(out, vec![5, 15, 0]);
    }

    #[test]
    fn test_header_rejects_size_below_preamble() {
        let mut cursor = Cursor::new(vec![1u8, 2, 0]);
        assert!(matches!(
            FrameHeader::read_from(&mut cursor),
            Err(FrameError::InvalidHeaderSize(2))
        ));
    }

    #[test]
    fn test_hand_built_short_header_is_rejected() {
        let header = FrameHeader { tag: 1, size: 2 };
        assert_eq!(header.body_len(), 0);

        let mut input = Cursor::new(vec![0u8; 8]);
        assert!(matches!(
            header.skip_body(&mut input),
            Err(FrameError::InvalidHeaderSize(2))
        ));
        assert!(matches!(
            header.read_body_bytes(&mut input),
            Err(FrameError::InvalidHeaderSize(2))
        ));
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_body_too_large_for_size_field() {
        assert!(matches!(
            FrameHeader::for_body(FrameType::Std2, 70_000),
            Err(FrameError::FrameTooLarge(70_003))
        ));
        let largest = usize::from(u16::MAX) - FRAME_HEADER_SIZE;
        assert_eq!(FrameHeader::for_body(FrameType::Std2, largest).unwrap().size, u16::MAX);
    }

    #[test]
    fn test_header_eof_handling() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(FrameHeader::try_read_from(&mut empty).unwrap().is_none());

        let mut partial = Cursor::new(vec![1u8, 9]);
        assert!(matches!(
            FrameHeader::try_read_from(&mut partial),
            Err(FrameError::Truncated { needed: 3, available: 2 })
        ));
    }

    #[test]
    fn test_every_variant_round_trips() {
        for frame in sample_frames() {
            let bytes = frame.to_bytes().unwrap();
            let mut cursor = Cursor::new(bytes);
            let decoded = Frame::read_from(&mut cursor, DecodeMode::Full).unwrap();
            assert_eq!(decoded.as_ref(), Some(&frame));
        }
    }

    #[test]
    fn test_size_field_matches_consumed_bytes() {
        for frame in sample_frames() {
            let bytes = frame.to_bytes().unwrap();
            let size = u16::from_le_bytes([bytes[1], bytes[2]]);
            assert_eq!(usize::from(size), bytes.len(), "{}", frame.frame_type());
            assert_eq!(size, frame.encoded_size().unwrap());

            let mut cursor = Cursor::new(bytes);
            Frame::read_from(&mut cursor, DecodeMode::Full).unwrap();
            assert_eq!(cursor.position(), u64::from(size));
        }
    }

    #[test]
    fn test_skip_mode_lands_on_next_tag() {
        let first = Frame::from(sample_std());
        let second = Frame::from(TaintFrame { id: 2, length: 1, addr: 0x10 });
        let mut bytes = first.to_bytes().unwrap();
        let first_size = bytes.len() as u64;
        bytes.extend(second.to_bytes().unwrap());

        let mut cursor = Cursor::new(bytes);
        assert!(Frame::read_from(&mut cursor, DecodeMode::Skip).unwrap().is_none());
        assert_eq!(cursor.position(), first_size);
        assert_eq!(cursor.get_ref()[cursor.position() as usize], FrameType::Taint.tag());
        assert_eq!(Frame::read_from(&mut cursor, DecodeMode::Full).unwrap(), Some(second));
    }

    #[test]
    fn test_unknown_tag_skips_but_does_not_decode() {
        let bytes = vec![0x7f, 7, 0, 0xaa, 0xbb, 0xcc, 0xdd];

        let mut cursor = Cursor::new(bytes.clone());
        assert!(Frame::read_from(&mut cursor, DecodeMode::Skip).unwrap().is_none());
        assert_eq!(cursor.position(), 7);

        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Frame::read_from(&mut cursor, DecodeMode::Full),
            Err(FrameError::UnknownFrameType(0x7f))
        ));
    }

    #[test]
    fn test_reserved_none_tag_is_fatal() {
        let mut cursor = Cursor::new(vec![FRM_NONE, 3, 0]);
        assert!(matches!(
            Frame::read_from(&mut cursor, DecodeMode::Full),
            Err(FrameError::UnknownFrameType(0))
        ));
    }

    #[test]
    fn test_truncated_body_yields_no_frame() {
        let mut bytes = Frame::from(sample_std()).to_bytes().unwrap();
        bytes.truncate(bytes.len() - 1);
        let mut cursor = Cursor::new(bytes);
        let err = Frame::read_from(&mut cursor, DecodeMode::Full).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_trailing_body_bytes_are_a_size_mismatch() {
        let mut bytes = Frame::from(TaintFrame { id: 1, length: 2, addr: 3 }).to_bytes().unwrap();
        bytes[1] += 2;
        bytes.extend([0, 0]);

        let header = FrameHeader::read_from(&mut Cursor::new(&bytes[..3])).unwrap();
        let body = &bytes[3..];
        assert!(matches!(
            Frame::decode_body(&header, body, true),
            Err(FrameError::SizeMismatch { declared: 14, consumed: 12 })
        ));
        assert!(Frame::decode_body(&header, body, false).is_ok());
    }

    #[test]
    fn test_short_size_field_is_truncation_of_body() {
        let mut bytes = Frame::from(TaintFrame { id: 1, length: 2, addr: 3 }).to_bytes().unwrap();
        bytes[1] -= 4;
        let mut cursor = Cursor::new(bytes);
        let err = Frame::read_from(&mut cursor, DecodeMode::Full).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { needed: 4, available: 0 }));
        // the declared body was still consumed
        assert_eq!(cursor.position(), 11);
    }
}
