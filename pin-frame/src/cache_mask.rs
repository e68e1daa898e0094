//! Per-operand "served from cache" bitmap

use serde::{Deserialize, Serialize};

/// Largest bitmap ever written, enough for the maximum operand count
pub const MAX_CACHEMASK_BYTES: usize = 2;

/// Number of bytes needed to hold `n` one-bit flags
///
/// `((n - 1) >> 3) + 1`, i.e. `ceil(n / 8)`. Zero flags need zero bytes.
pub fn packed_bytes(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    ((n - 1) >> 3) + 1
}

/// Bitmap flagging operand slots whose value was reused from the recorder's
/// instruction cache rather than freshly captured
///
/// Bit `i % 8` of byte `i / 8` belongs to slot `i`. The codec copies the
/// bytes verbatim and never interprets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheMask([u8; MAX_CACHEMASK_BYTES]);

impl CacheMask {
    /// Create an empty mask
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw mask bytes
    pub fn from_bytes(bytes: [u8; MAX_CACHEMASK_BYTES]) -> Self {
        Self(bytes)
    }

    /// Mark every slot as not cached
    pub fn clear(&mut self) {
        self.0 = [0; MAX_CACHEMASK_BYTES];
    }

    /// Mark `slot` as cached; slots past the mask are ignored
    pub fn set_cached(&mut self, slot: usize) {
        if let Some(byte) = self.0.get_mut(slot >> 3) {
            *byte |= 1 << (slot & 7);
        }
    }

    /// Mark `slot` as not cached
    pub fn unset_cached(&mut self, slot: usize) {
        if let Some(byte) = self.0.get_mut(slot >> 3) {
            *byte &= !(1 << (slot & 7));
        }
    }

    /// True when `slot` is marked; false for slots past the mask
    pub fn is_cached(&self, slot: usize) -> bool {
        self.0
            .get(slot >> 3)
            .map_or(false, |byte| byte & (1 << (slot & 7)) != 0)
    }

    /// Wire bytes for a frame carrying `values_count` operands
    pub fn packed(&self, values_count: usize) -> &[u8] {
        &self.0[..packed_bytes(values_count).min(MAX_CACHEMASK_BYTES)]
    }

    /// Rebuild from the wire bytes; slots past the read bytes are clear
    pub fn from_packed(packed: &[u8]) -> Self {
        let mut mask = Self::default();
        let n = packed.len().min(MAX_CACHEMASK_BYTES);
        mask.0[..n].copy_from_slice(&packed[..n]);
        mask
    }

    /// Raw mask bytes
    pub fn as_bytes(&self) -> &[u8; MAX_CACHEMASK_BYTES] {
        &self.0
    }
}
