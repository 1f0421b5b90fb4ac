//! Size/flag field encoding
//!
//! Every data block and fragment block is described by a 32 bit field that
//! packs the number of bytes stored on disk together with an "uncompressed"
//! marker:
//!
//! ```text
//!  31       25 24 23                                  0
//! ┌──────────┬──┬─────────────────────────────────────┐
//! │ reserved │U │ on-disk length (bytes)              │
//! └──────────┴──┴─────────────────────────────────────┘
//! ```
//!
//! The length always holds the bytes actually written, which is the
//! compressed size unless `U` is set. Block sizes are therefore bounded to
//! less than 16 MiB.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};

/// Bit marking a block that is stored without compression
pub const UNCOMPRESSED_BIT: u32 = 1 << 24;

/// Largest length representable in a size field
pub const MAX_ENCODED_LEN: u32 = UNCOMPRESSED_BIT - 1;

/// Packed on-disk length + uncompressed flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeField(u32);

impl SizeField {
    /// Encode a stored length and whether the data was stored raw
    pub fn encode(length: usize, stored_raw: bool) -> Result<Self> {
        if length > MAX_ENCODED_LEN as usize {
            return Err(PackError::SizeOverflow(length));
        }

        let mut field = length as u32;
        if stored_raw {
            field |= UNCOMPRESSED_BIT;
        }
        Ok(SizeField(field))
    }

    /// Split the field back into `(length, stored_raw)`
    pub fn decode(self) -> (u32, bool) {
        (self.0 & MAX_ENCODED_LEN, self.0 & UNCOMPRESSED_BIT != 0)
    }

    /// Number of bytes stored on disk
    pub fn len(self) -> u32 {
        self.decode().0
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// True if the data was written without compression
    pub fn is_raw(self) -> bool {
        self.decode().1
    }

    /// Wrap a field read back from disk
    pub fn from_raw(raw: u32) -> Self {
        SizeField(raw)
    }

    /// The on-disk value
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_compressed() {
        let field = SizeField::encode(1234, false).unwrap();
        assert_eq!(field.raw(), 1234);
        assert_eq!(field.decode(), (1234, false));
        assert!(!field.is_raw());
    }

    #[test]
    fn test_encode_raw_sets_bit_24() {
        let field = SizeField::encode(4096, true).unwrap();
        assert_eq!(field.raw(), 4096 | 0x0100_0000);
        assert_eq!(field.decode(), (4096, true));
        assert!(field.is_raw());
    }

    #[test]
    fn test_encode_limits() {
        let max = SizeField::encode(MAX_ENCODED_LEN as usize, true).unwrap();
        assert_eq!(max.decode(), (MAX_ENCODED_LEN, true));

        assert!(matches!(
            SizeField::encode(MAX_ENCODED_LEN as usize + 1, false),
            Err(PackError::SizeOverflow(_))
        ));
    }

    #[test]
    fn test_zero_length() {
        let field = SizeField::encode(0, false).unwrap();
        assert!(field.is_empty());
        assert_eq!(field.decode(), (0, false));
    }

    #[test]
    fn test_le_bytes() {
        let field = SizeField::encode(0x10, true).unwrap();
        assert_eq!(field.to_le_bytes(), [0x10, 0x00, 0x00, 0x01]);
        assert_eq!(SizeField::from_raw(u32::from_le_bytes(field.to_le_bytes())), field);
    }
}
