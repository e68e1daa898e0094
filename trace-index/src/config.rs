//! Index build configuration

use std::path::{Path, PathBuf};

/// Configuration for building and caching trace indexes
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory holding cached index files
    pub cache_dir: PathBuf,
    /// Decode module-load frames so the index can list loaded modules
    pub decode_modules: bool,
    /// Accept frames whose body is longer than their decoded fields
    pub lenient_sizes: bool,
}

impl IndexConfig {
    /// Create a default config caching under `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Cached index location for a trace file
    pub fn index_path(&self, trace_path: &Path) -> PathBuf {
        let stem = trace_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trace".to_string());
        self.cache_dir.join(format!("{}.index.json", stem))
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache/trace-index"),
            decode_modules: true,
            lenient_sizes: false,
        }
    }
}
