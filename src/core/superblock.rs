//! Image-wide constants and feature flags
//!
//! The superblock itself is serialized after the data region; the packing
//! engine only decides the block size and the fragment related flags.

use crate::codec::MAX_ENCODED_LEN;
use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};

/// Default data block size (128 KiB)
pub const DEFAULT_BLOCK_SIZE: u32 = 128 * 1024;

/// Superblock feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageFlags(u16);

impl ImageFlags {
    pub const NO_FRAGMENTS: u16 = 0x0010;
    pub const ALWAYS_FRAGMENTS: u16 = 0x0020;

    /// Flags a fresh image starts with, before any fragment block is written
    pub fn initial() -> Self {
        ImageFlags(Self::NO_FRAGMENTS)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    /// Record that at least one fragment block has been written
    pub fn mark_fragments_used(&mut self) {
        self.0 &= !Self::NO_FRAGMENTS;
        self.0 |= Self::ALWAYS_FRAGMENTS;
    }
}

/// Check that a block size can be described by a size field
pub fn validate_block_size(block_size: u32) -> Result<()> {
    if block_size == 0 || block_size > MAX_ENCODED_LEN {
        return Err(PackError::InvalidBlockSize(block_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_flags() {
        let flags = ImageFlags::initial();
        assert!(flags.contains(ImageFlags::NO_FRAGMENTS));
        assert!(!flags.contains(ImageFlags::ALWAYS_FRAGMENTS));
    }

    #[test]
    fn test_mark_fragments_used() {
        let mut flags = ImageFlags::initial();
        flags.mark_fragments_used();
        flags.mark_fragments_used();

        assert!(!flags.contains(ImageFlags::NO_FRAGMENTS));
        assert!(flags.contains(ImageFlags::ALWAYS_FRAGMENTS));
        assert_eq!(flags.bits(), 0x0020);
    }

    #[test]
    fn test_validate_block_size() {
        assert!(validate_block_size(4).is_ok());
        assert!(validate_block_size(DEFAULT_BLOCK_SIZE).is_ok());
        assert!(validate_block_size(MAX_ENCODED_LEN).is_ok());
        assert!(matches!(
            validate_block_size(0),
            Err(PackError::InvalidBlockSize(0))
        ));
        assert!(matches!(
            validate_block_size(1 << 24),
            Err(PackError::InvalidBlockSize(_))
        ));
    }
}
