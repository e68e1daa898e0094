//! Human-readable trace summary

use crate::index::{FrameCounts, TraceIndex};
use pin_frame::FrameType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate view of an indexed trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Per-kind frame counts
    pub counts: FrameCounts,
    /// Bytes scanned
    pub total_bytes: u64,
    /// Number of register checkpoints
    pub checkpoints: usize,
    /// Module names in load order
    pub modules: Vec<String>,
    /// Mean on-wire size of instruction frames, if any were recorded
    pub mean_instruction_frame_size: Option<f64>,
}

impl TraceSummary {
    /// Summarize an already built index
    pub fn from_index(index: &TraceIndex) -> Self {
        let (count, bytes) = index
            .frames
            .iter()
            .filter(|e| matches!(e.frame_type(), Some(FrameType::Std | FrameType::Std2)))
            .fold((0u64, 0u64), |(n, b), e| (n + 1, b + u64::from(e.size)));

        Self {
            counts: index.counts,
            total_bytes: index.total_bytes,
            checkpoints: index.keyframes.len(),
            modules: index.modules.iter().map(|m| m.name.clone()).collect(),
            mean_instruction_frame_size: (count > 0).then(|| bytes as f64 / count as f64),
        }
    }

    /// Get total number of frames
    pub fn total_frames(&self) -> u64 {
        self.counts.total()
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frames:      {}", self.total_frames())?;
        writeln!(f, "  std:       {}", self.counts.std)?;
        writeln!(f, "  std2:      {}", self.counts.std2)?;
        writeln!(f, "  key:       {}", self.counts.key)?;
        writeln!(f, "  loadmod:   {}", self.counts.load_module)?;
        writeln!(f, "  syscall:   {}", self.counts.syscall)?;
        writeln!(f, "  taint:     {}", self.counts.taint)?;
        if self.counts.unknown > 0 {
            writeln!(f, "  unknown:   {}", self.counts.unknown)?;
        }
        writeln!(f, "bytes:       {}", self.total_bytes)?;
        if let Some(mean) = self.mean_instruction_frame_size {
            writeln!(f, "insn frame:  {:.1} bytes avg", mean)?;
        }
        write!(f, "modules:     {}", self.modules.join(", "))
    }
}
