//! Trace Index - Offline indexing of pin-frame traces
//!
//! This crate scans a recorded trace without decoding per-instruction frames
//! and records where every frame starts, where register checkpoints sit and
//! which modules were loaded. Analysis tools use the index to resume decoding
//! from the nearest checkpoint instead of replaying the whole trace.

pub mod config;
pub mod index;
pub mod summary;

pub use config::IndexConfig;
pub use index::{FrameCounts, IndexEntry, KeyframeEntry, ModuleEntry, TraceIndex};
pub use summary::TraceSummary;

use std::path::Path;

/// Result type for indexing operations
pub type Result<T> = anyhow::Result<T>;

/// High-level API: summarize a trace file, reusing a cached index when valid
pub fn summarize_trace(trace_path: &Path, config: &IndexConfig) -> Result<TraceSummary> {
    tracing::info!("Summarizing trace {:?}", trace_path);
    let index = TraceIndex::load_or_build(trace_path, config)?;
    let summary = TraceSummary::from_index(&index);
    tracing::debug!("Trace summary: {:?}", summary);
    Ok(summary)
}
