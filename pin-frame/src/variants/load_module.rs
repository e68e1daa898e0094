//! Module load event

use crate::frame::{FrameBody, FrameType};
use crate::wire::{self, BodyReader};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Capacity of the module name buffer
pub const MODULE_NAME_LEN: usize = 64;

const LOAD_MODULE_BODY_SIZE: usize = 4 * 4 + MODULE_NAME_LEN;

/// A module mapped at `[low_addr, high_addr)`
///
/// The name buffer always goes on the wire in full; whatever follows the
/// name (terminator, padding) is carried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadModuleFrame {
    /// First mapped address
    pub low_addr: u32,
    /// End of the mapping, exclusive
    pub high_addr: u32,
    /// Entry point
    pub start_addr: u32,
    /// Load bias applied to the module image
    pub load_offset: u32,
    /// NUL-terminated name, zero padded
    #[serde(with = "name_hex")]
    pub name: [u8; MODULE_NAME_LEN],
}

impl Default for LoadModuleFrame {
    fn default() -> Self {
        Self {
            low_addr: 0,
            high_addr: 0,
            start_addr: 0,
            load_offset: 0,
            name: [0; MODULE_NAME_LEN],
        }
    }
}

impl LoadModuleFrame {
    /// Build a frame, truncating `name` to the buffer and zero-padding the rest
    pub fn with_name(
        low_addr: u32,
        high_addr: u32,
        start_addr: u32,
        load_offset: u32,
        name: &str,
    ) -> Self {
        let mut buf = [0u8; MODULE_NAME_LEN];
        let len = name.len().min(MODULE_NAME_LEN);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            low_addr,
            high_addr,
            start_addr,
            load_offset,
            name: buf,
        }
    }

    /// Name up to the first NUL, lossily decoded
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MODULE_NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// True when `addr` falls inside the mapping
    pub fn contains(&self, addr: u32) -> bool {
        (self.low_addr..self.high_addr).contains(&addr)
    }
}

impl FrameBody for LoadModuleFrame {
    const FRAME_TYPE: FrameType = FrameType::LoadModule;

    fn body_size(&self) -> Result<usize> {
        Ok(LOAD_MODULE_BODY_SIZE)
    }

    fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        wire::write_u32(out, self.low_addr)?;
        wire::write_u32(out, self.high_addr)?;
        wire::write_u32(out, self.start_addr)?;
        wire::write_u32(out, self.load_offset)?;
        out.write_all(&self.name)?;
        Ok(())
    }

    fn read_body(r: &mut BodyReader<'_>) -> Result<Self> {
        let low_addr = r.read_u32()?;
        let high_addr = r.read_u32()?;
        let start_addr = r.read_u32()?;
        let load_offset = r.read_u32()?;
        let mut name = [0u8; MODULE_NAME_LEN];
        name.copy_from_slice(r.read_bytes(MODULE_NAME_LEN)?);
        Ok(Self {
            low_addr,
            high_addr,
            start_addr,
            load_offset,
            name,
        })
    }
}

/// Name buffer as a hex string; serde has no impls for 64-element arrays
mod name_hex {
    use super::MODULE_NAME_LEN;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(name: &[u8; MODULE_NAME_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(name))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; MODULE_NAME_LEN], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::invalid_length(b.len(), &"64 name bytes"))
    }
}
