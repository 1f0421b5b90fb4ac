//! Block compressors
//!
//! The packer hands every full block and every fragment block to a
//! [`Compressor`]. A compressor either produces a smaller encoding in the
//! destination buffer or declines, in which case the source bytes are stored
//! raw and the size field gets its uncompressed bit.
//!
//! **Policy**:
//! - Inputs shorter than `threshold` bytes are declined outright
//! - Output that is not strictly smaller than the input is declined
//! - Output that does not fit the destination buffer is declined
//!
//! LZ4 output uses the raw block format (no frame, no size prefix); Zstd
//! output is a regular zstd frame.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Result of compressing one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// `n` bytes of compressed data were written to the destination buffer
    Compressed(usize),
    /// Compression declined; the source bytes are written unchanged
    StoreRaw,
}

impl BlockOutcome {
    /// Interpret a `do_block` style return value
    ///
    /// Negative values are failures, zero means "store raw" and positive
    /// values are the compressed byte count.
    pub fn from_ssize(ret: isize) -> Result<Self> {
        match ret {
            r if r < 0 => Err(PackError::Compressor(format!(
                "compressor returned error code {}",
                r
            ))),
            0 => Ok(BlockOutcome::StoreRaw),
            n => Ok(BlockOutcome::Compressed(n as usize)),
        }
    }
}

/// Pluggable block compressor
pub trait Compressor {
    /// Compress `src` into `dst`
    ///
    /// `dst` is at least one block long. Implementations must not assume
    /// their output is used unless they return [`BlockOutcome::Compressed`].
    fn compress_block(&mut self, src: &[u8], dst: &mut [u8]) -> Result<BlockOutcome>;

    /// Method identifier recorded in the image
    fn method(&self) -> CompressionMethod;
}

/// Compression method for data blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression, every block is stored raw
    None = 0,
    /// LZ4 compression (fast, moderate ratio)
    Lz4 = 5,
    /// Zstd compression (slower, better ratio)
    Zstd = 6,
}

impl CompressionMethod {
    /// Parse a method name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "raw" => Some(CompressionMethod::None),
            "lz4" => Some(CompressionMethod::Lz4),
            "zstd" => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compression method to use
    pub method: CompressionMethod,

    /// Compression level (only used by zstd)
    pub level: i32,

    /// Minimum size to compress (bytes)
    /// Blocks smaller than this are stored raw
    pub threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            level: 0,
            threshold: 64,
        }
    }
}

impl CompressionConfig {
    /// Create config with no compression
    pub fn none() -> Self {
        CompressionConfig {
            method: CompressionMethod::None,
            level: 0,
            threshold: usize::MAX,
        }
    }

    /// Create config with LZ4 compression
    pub fn lz4() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            ..Default::default()
        }
    }

    /// Create config with Zstd compression
    pub fn zstd() -> Self {
        CompressionConfig {
            method: CompressionMethod::Zstd,
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
            threshold: 128, // Zstd frame overhead is higher
        }
    }

    /// Instantiate the configured compressor
    pub fn build(&self) -> Result<Box<dyn Compressor>> {
        Ok(match self.method {
            CompressionMethod::None => Box::new(NoCompression),
            CompressionMethod::Lz4 => Box::new(Lz4Compressor::new(self.threshold)),
            CompressionMethod::Zstd => Box::new(ZstdCompressor::new(self.level, self.threshold)?),
        })
    }
}

/// Compressor that declines every block
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress_block(&mut self, _src: &[u8], _dst: &mut [u8]) -> Result<BlockOutcome> {
        Ok(BlockOutcome::StoreRaw)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

/// LZ4 block compressor
#[derive(Debug, Clone)]
pub struct Lz4Compressor {
    threshold: usize,
}

impl Lz4Compressor {
    pub fn new(threshold: usize) -> Self {
        Lz4Compressor { threshold }
    }
}

impl Compressor for Lz4Compressor {
    fn compress_block(&mut self, src: &[u8], dst: &mut [u8]) -> Result<BlockOutcome> {
        if src.is_empty() || src.len() < self.threshold {
            return Ok(BlockOutcome::StoreRaw);
        }

        // Fails only when the output would not fit dst
        match lz4_flex::block::compress_into(src, dst) {
            Ok(n) => Ok(worth_keeping(n, src.len())),
            Err(_) => Ok(BlockOutcome::StoreRaw),
        }
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Lz4
    }
}

/// Zstd block compressor with a reused compression context
pub struct ZstdCompressor {
    inner: zstd::bulk::Compressor<'static>,
    threshold: usize,
}

impl ZstdCompressor {
    pub fn new(level: i32, threshold: usize) -> Result<Self> {
        let inner = zstd::bulk::Compressor::new(level)
            .map_err(|e| PackError::Compressor(format!("Zstd init failed: {}", e)))?;
        Ok(ZstdCompressor { inner, threshold })
    }
}

impl Compressor for ZstdCompressor {
    fn compress_block(&mut self, src: &[u8], dst: &mut [u8]) -> Result<BlockOutcome> {
        if src.is_empty() || src.len() < self.threshold {
            return Ok(BlockOutcome::StoreRaw);
        }

        match self.inner.compress_to_buffer(src, dst) {
            Ok(n) => Ok(worth_keeping(n, src.len())),
            Err(e) => {
                trace!("Zstd output did not fit {} bytes: {}", dst.len(), e);
                Ok(BlockOutcome::StoreRaw)
            }
        }
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// Keep `n` bytes of output already in `dst` only if they save space
fn worth_keeping(n: usize, src_len: usize) -> BlockOutcome {
    if n == 0 || n >= src_len {
        BlockOutcome::StoreRaw
    } else {
        BlockOutcome::Compressed(n)
    }
}
