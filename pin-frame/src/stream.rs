//! Sequential frame readers and writers over byte streams

use crate::frame::{DecodeMode, Frame, FrameHeader};
use crate::variants::KeyFrame;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// How a [`FrameReader`] treats the frames it meets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Decode frames or only step over them
    pub mode: DecodeMode,
    /// Fail when a body decode leaves declared bytes unconsumed
    pub verify_size: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: DecodeMode::Full,
            verify_size: true,
        }
    }
}

/// Appends frames to a trace, tracking where each one lands
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
    bytes_written: u64,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Create a writer positioned at offset zero of `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            frames_written: 0,
        }
    }

    /// Encode `frame`, returning the stream offset of its tag byte
    pub fn write_frame(&mut self, frame: &Frame) -> Result<u64> {
        let offset = self.bytes_written;
        let written = frame.write_to(&mut self.writer)?;
        self.bytes_written += written as u64;
        self.frames_written += 1;
        tracing::trace!("Wrote {} frame at offset {}", frame.frame_type(), offset);
        Ok(offset)
    }

    /// Write a register checkpoint stamped with the current frame count
    pub fn checkpoint(&mut self, mut registers: KeyFrame) -> Result<u64> {
        registers.pos = self.frames_written;
        self.write_frame(&Frame::Key(registers))
    }

    /// Get total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get number of frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush the underlying sink
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Give back the underlying sink
    pub fn into_inner(self) -> W {
        tracing::debug!(
            "Closing frame writer: {} frames, {} bytes",
            self.frames_written,
            self.bytes_written
        );
        self.writer
    }
}

/// Byte source that remembers how much has been pulled from it
#[derive(Debug)]
struct CountingReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Reads a trace one frame at a time
///
/// The reader never looks ahead: after each call the underlying stream sits
/// on a frame boundary, unless the call failed on malformed or truncated input.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: CountingReader<R>,
    config: ReaderConfig,
    frames_seen: u64,
    failed: bool,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader with the default (full decode, strict size) config
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ReaderConfig::default())
    }

    /// Create a reader with an explicit config
    pub fn with_config(reader: R, config: ReaderConfig) -> Self {
        Self {
            reader: CountingReader {
                inner: reader,
                consumed: 0,
            },
            config,
            frames_seen: 0,
            failed: false,
        }
    }

    /// Get the reader configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Stream offset of the next unread byte
    ///
    /// Counts every byte taken from the source, including those consumed by
    /// a call that then failed.
    pub fn offset(&self) -> u64 {
        self.reader.consumed
    }

    /// Frames decoded or skipped so far
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Give back the underlying source
    pub fn into_inner(self) -> R {
        self.reader.inner
    }

    /// Read the next preamble, or `None` at a clean end of stream
    pub fn next_header(&mut self) -> Result<Option<FrameHeader>> {
        FrameHeader::try_read_from(&mut self.reader)
    }

    /// Decode the body that follows `header`
    pub fn read_body(&mut self, header: &FrameHeader) -> Result<Frame> {
        let body = header.read_body_bytes(&mut self.reader)?;
        self.frames_seen += 1;
        Frame::decode_body(header, &body, self.config.verify_size)
    }

    /// Step over the body that follows `header`
    pub fn skip_body(&mut self, header: &FrameHeader) -> Result<()> {
        header.skip_body(&mut self.reader)?;
        self.frames_seen += 1;
        Ok(())
    }

    /// Step over one whole frame, returning its preamble
    pub fn skip_frame(&mut self) -> Result<Option<FrameHeader>> {
        match self.next_header()? {
            Some(header) => {
                self.skip_body(&header)?;
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    /// Next frame in full-decode mode; in skip mode, drain the stream and
    /// return `None`
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(header) = self.next_header()? {
            match self.config.mode {
                DecodeMode::Full => return self.read_body(&header).map(Some),
                DecodeMode::Skip => self.skip_body(&header)?,
            }
        }
        tracing::debug!(
            "End of trace after {} frames, {} bytes",
            self.frames_seen,
            self.offset()
        );
        Ok(None)
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Frame>;

    /// Stops after the first error
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
