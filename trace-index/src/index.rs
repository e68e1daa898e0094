//! Frame index built by scanning a trace
//!
//! The scan reads every frame header and skips bodies, except for
//! checkpoints (always decoded) and module loads (decoded on request).

use crate::config::IndexConfig;
use crate::Result;
use anyhow::Context;
use pin_frame::{DecodeMode, Frame, FrameReader, FrameType, ReaderConfig};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Location of one frame in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Offset of the frame's tag byte
    pub offset: u64,
    /// Raw tag, kept even when unknown to this decoder
    pub tag: u8,
    /// Total frame length including the preamble
    pub size: u16,
}

impl IndexEntry {
    /// Known frame type for the tag, `None` for unassigned tags
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.tag).ok()
    }
}

/// A register checkpoint usable as a resynchronization point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframeEntry {
    /// Position of the checkpoint among all frames
    pub frame_number: u64,
    /// Offset of the checkpoint's tag byte
    pub offset: u64,
    /// Frame counter recorded inside the checkpoint
    pub pos: u64,
}

/// A module load seen in the trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Position of the load frame among all frames
    pub frame_number: u64,
    /// Module name up to its first NUL
    pub name: String,
    /// First mapped address
    pub low_addr: u32,
    /// End of the mapping, exclusive
    pub high_addr: u32,
    /// Entry point
    pub start_addr: u32,
    /// Load bias applied to the module image
    pub load_offset: u32,
}

/// Number of frames of each kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCounts {
    /// Fixed-width instruction frames
    pub std: u64,
    /// Type-packed instruction frames
    pub std2: u64,
    /// Register checkpoints
    pub key: u64,
    /// Module loads
    pub load_module: u64,
    /// System calls
    pub syscall: u64,
    /// Taint introductions
    pub taint: u64,
    /// Frames with tags this decoder does not know
    pub unknown: u64,
}

impl FrameCounts {
    /// Count one frame of `frame_type`; `None` counts as unknown
    pub fn record(&mut self, frame_type: Option<FrameType>) {
        let slot = match frame_type {
            Some(FrameType::Std) => &mut self.std,
            Some(FrameType::Std2) => &mut self.std2,
            Some(FrameType::Key) => &mut self.key,
            Some(FrameType::LoadModule) => &mut self.load_module,
            Some(FrameType::Syscall) => &mut self.syscall,
            Some(FrameType::Taint) => &mut self.taint,
            None => &mut self.unknown,
        };
        *slot += 1;
    }

    /// Frames of every kind, unknown included
    pub fn total(&self) -> u64 {
        [
            self.std,
            self.std2,
            self.key,
            self.load_module,
            self.syscall,
            self.taint,
            self.unknown,
        ]
        .iter()
        .sum()
    }
}

/// Offsets of every frame in a trace plus its checkpoints and modules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceIndex {
    /// Every frame in stream order
    pub frames: Vec<IndexEntry>,
    /// Checkpoints in stream order
    pub keyframes: Vec<KeyframeEntry>,
    /// Module loads in stream order
    pub modules: Vec<ModuleEntry>,
    /// Per-kind frame counts
    pub counts: FrameCounts,
    /// Bytes scanned; equals the trace length for a complete trace
    pub total_bytes: u64,
}

impl TraceIndex {
    /// Scan a trace from its first frame to a clean end of stream
    pub fn build<R: Read>(reader: R, config: &IndexConfig) -> Result<Self> {
        let reader_config = ReaderConfig {
            mode: DecodeMode::Skip,
            verify_size: !config.lenient_sizes,
        };
        let mut frames = FrameReader::with_config(reader, reader_config);
        let mut index = TraceIndex::default();

        loop {
            let offset = frames.offset();
            let header = match frames
                .next_header()
                .with_context(|| format!("Failed to read frame header at offset {}", offset))?
            {
                Some(header) => header,
                None => break,
            };
            let frame_number = index.frames.len() as u64;
            let frame_type = header.frame_type();

            match frame_type {
                Some(FrameType::Key) => {
                    let frame = frames
                        .read_body(&header)
                        .with_context(|| {
                            format!("Failed to decode checkpoint at offset {}", offset)
                        })?;
                    if let Frame::Key(key) = frame {
                        index.keyframes.push(KeyframeEntry {
                            frame_number,
                            offset,
                            pos: key.pos,
                        });
                    }
                }
                Some(FrameType::LoadModule) if config.decode_modules => {
                    let frame = frames
                        .read_body(&header)
                        .with_context(|| {
                            format!("Failed to decode module load at offset {}", offset)
                        })?;
                    if let Frame::LoadModule(module) = frame {
                        index.modules.push(ModuleEntry {
                            frame_number,
                            name: module.name_str(),
                            low_addr: module.low_addr,
                            high_addr: module.high_addr,
                            start_addr: module.start_addr,
                            load_offset: module.load_offset,
                        });
                    }
                }
                _ => {
                    frames
                        .skip_body(&header)
                        .with_context(|| format!("Failed to skip frame at offset {}", offset))?;
                }
            }

            if frame_type.is_none() {
                tracing::warn!(
                    "Skipped frame with unknown tag {} at offset {}",
                    header.tag,
                    offset
                );
            }
            index.counts.record(frame_type);
            index.frames.push(IndexEntry {
                offset,
                tag: header.tag,
                size: header.size,
            });
        }

        index.total_bytes = frames.offset();
        tracing::info!(
            "Indexed {} frames ({} checkpoints, {} modules), {} bytes",
            index.frames.len(),
            index.keyframes.len(),
            index.modules.len(),
            index.total_bytes
        );
        Ok(index)
    }

    /// Index a trace file
    pub fn build_from_path(trace_path: &Path, config: &IndexConfig) -> Result<Self> {
        let file = File::open(trace_path)
            .with_context(|| format!("Failed to open trace file: {:?}", trace_path))?;
        Self::build(BufReader::new(file), config)
            .with_context(|| format!("Failed to index trace {:?}", trace_path))
    }

    /// Load a cached index, or build and cache a fresh one
    ///
    /// A cached index whose byte count disagrees with the trace's current
    /// length is treated as stale.
    pub fn load_or_build(trace_path: &Path, config: &IndexConfig) -> Result<Self> {
        let index_path = config.index_path(trace_path);
        if index_path.exists() {
            tracing::info!("Found cached index {:?}, attempting to load...", index_path);
            match Self::load_from_cache(trace_path, config) {
                Ok(index) => return Ok(index),
                Err(e) => tracing::warn!("Failed to load cached index: {}. Rebuilding...", e),
            }
        }

        let index = Self::build_from_path(trace_path, config)?;
        index
            .save_to_cache(trace_path, config)
            .context("Failed to cache trace index")?;
        Ok(index)
    }

    /// Read the cached index for `trace_path`, rejecting stale ones
    pub fn load_from_cache(trace_path: &Path, config: &IndexConfig) -> Result<Self> {
        let index_path = config.index_path(trace_path);
        let bytes = fs::read(&index_path)
            .with_context(|| format!("Failed to read index file: {:?}", index_path))?;
        let index = Self::from_bytes(&bytes)
            .with_context(|| format!("Failed to deserialize index from {:?}", index_path))?;

        let trace_len = fs::metadata(trace_path)
            .with_context(|| format!("Failed to stat trace file: {:?}", trace_path))?
            .len();
        if trace_len != index.total_bytes {
            anyhow::bail!(
                "stale index: covers {} bytes, trace is {} bytes",
                index.total_bytes,
                trace_len
            );
        }
        Ok(index)
    }

    /// Write this index as the cached index for `trace_path`
    pub fn save_to_cache(&self, trace_path: &Path, config: &IndexConfig) -> Result<()> {
        fs::create_dir_all(&config.cache_dir).context("Failed to create cache directory")?;

        let index_path = config.index_path(trace_path);
        tracing::info!("Saving index to cache: {:?}", index_path);
        let file = File::create(&index_path)
            .with_context(|| format!("Failed to create index file: {:?}", index_path))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&self.to_bytes()?)
            .with_context(|| format!("Failed to write index to {:?}", index_path))?;
        writer.flush()?;
        Ok(())
    }

    /// Serialize the index to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize an index from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Get number of indexed frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Location of frame `frame_number`, if the trace has that many frames
    pub fn entry(&self, frame_number: u64) -> Option<&IndexEntry> {
        usize::try_from(frame_number).ok().and_then(|n| self.frames.get(n))
    }

    /// Last checkpoint at or before `frame_number`
    pub fn nearest_keyframe(&self, frame_number: u64) -> Option<&KeyframeEntry> {
        let after = self
            .keyframes
            .partition_point(|k| k.frame_number <= frame_number);
        after.checked_sub(1).map(|i| &self.keyframes[i])
    }

    /// Most recently loaded module covering `addr`
    pub fn module_containing(&self, addr: u32) -> Option<&ModuleEntry> {
        self.modules
            .iter()
            .rev()
            .find(|m| (m.low_addr..m.high_addr).contains(&addr))
    }

    /// Position `reader` on the checkpoint preceding `frame_number`
    ///
    /// Returns the checkpoint used, or `None` (reader untouched) when no
    /// checkpoint precedes the frame.
    pub fn seek_to_keyframe<R: Seek>(
        &self,
        reader: &mut R,
        frame_number: u64,
    ) -> Result<Option<KeyframeEntry>> {
        let Some(key) = self.nearest_keyframe(frame_number).copied() else {
            return Ok(None);
        };
        reader
            .seek(SeekFrom::Start(key.offset))
            .with_context(|| format!("Failed to seek to checkpoint at offset {}", key.offset))?;
        tracing::debug!(
            "Resynchronized at checkpoint frame {} (offset {})",
            key.frame_number,
            key.offset
        );
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pin_frame::{FrameWriter, KeyFrame, LoadModuleFrame, SyscallFrame, TaintFrame};
    use std::io::Cursor;

    fn trace_with_checkpoints() -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        writer
            .write_frame(&LoadModuleFrame::with_name(0x1000, 0x2000, 0x1010, 0, "prog").into())
            .unwrap();
        for i in 0..10u32 {
            if i % 4 == 0 {
                writer.checkpoint(KeyFrame { eax: i, ..KeyFrame::default() }).unwrap();
            }
            writer
                .write_frame(&TaintFrame { id: i, length: 1, addr: 0x1800 + i }.into())
                .unwrap();
        }
        writer.write_frame(&SyscallFrame::default().into()).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_build_counts_and_offsets() {
        let bytes = trace_with_checkpoints();
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();

        assert_eq!(index.frame_count(), 1 + 3 + 10 + 1);
        assert_eq!(index.counts.taint, 10);
        assert_eq!(index.counts.key, 3);
        assert_eq!(index.counts.total(), index.frame_count() as u64);
        assert_eq!(index.total_bytes, bytes.len() as u64);

        for entry in &index.frames {
            assert_eq!(bytes[entry.offset as usize], entry.tag);
        }
        let last = index.frames.last().unwrap();
        assert_eq!(last.offset + u64::from(last.size), bytes.len() as u64);
    }

    #[test]
    fn test_keyframes_and_modules() {
        let bytes = trace_with_checkpoints();
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();

        let numbers: Vec<u64> = index.keyframes.iter().map(|k| k.frame_number).collect();
        assert_eq!(numbers, vec![1, 6, 11]);
        assert!(index.keyframes.iter().all(|k| k.pos == k.frame_number));

        assert_eq!(index.modules.len(), 1);
        assert_eq!(index.modules[0].name, "prog");
        assert_eq!(index.module_containing(0x1fff).map(|m| m.name.as_str()), Some("prog"));
        assert!(index.module_containing(0x2000).is_none());
    }

    #[test]
    fn test_modules_not_decoded_when_disabled() {
        let bytes = trace_with_checkpoints();
        let config = IndexConfig {
            decode_modules: false,
            ..IndexConfig::default()
        };
        let index = TraceIndex::build(Cursor::new(&bytes), &config).unwrap();
        assert!(index.modules.is_empty());
        assert_eq!(index.counts.load_module, 1);
    }

    #[test]
    fn test_nearest_keyframe() {
        let bytes = trace_with_checkpoints();
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();

        assert!(index.nearest_keyframe(0).is_none());
        assert_eq!(index.nearest_keyframe(1).unwrap().frame_number, 1);
        assert_eq!(index.nearest_keyframe(5).unwrap().frame_number, 1);
        assert_eq!(index.nearest_keyframe(6).unwrap().frame_number, 6);
        assert_eq!(index.nearest_keyframe(1000).unwrap().frame_number, 11);
    }

    #[test]
    fn test_seek_to_keyframe_resumes_decoding() {
        let bytes = trace_with_checkpoints();
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();

        let mut cursor = Cursor::new(bytes);
        let key = index.seek_to_keyframe(&mut cursor, 9).unwrap().unwrap();
        assert_eq!(key.frame_number, 6);

        let mut frames = FrameReader::new(cursor);
        match frames.next_frame().unwrap() {
            Some(Frame::Key(k)) => assert_eq!(k.eax, 4),
            other => panic!("expected checkpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tags_are_indexed() {
        let mut bytes = vec![0x40, 5, 0, 0xaa, 0xbb];
        bytes.extend(Frame::from(TaintFrame::default()).to_bytes().unwrap());
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();
        assert_eq!(index.counts.unknown, 1);
        assert_eq!(index.frames[0].frame_type(), None);
        assert_eq!(index.frames[1].offset, 5);
    }

    #[test]
    fn test_truncated_trace_fails() {
        let mut bytes = trace_with_checkpoints();
        bytes.truncate(bytes.len() - 1);
        let err = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to skip frame"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let bytes = trace_with_checkpoints();
        let index = TraceIndex::build(Cursor::new(&bytes), &IndexConfig::default()).unwrap();
        let restored = TraceIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, index);
    }
}
