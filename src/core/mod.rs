//! Packing engine internals
//!
//! - [`codec`] - Size/flag field encoding for blocks and fragments
//! - [`compression`] - Compressor port and the LZ4/Zstd/raw compressors
//! - [`io`] - Append-only output sink and retrying transfer helpers
//! - [`fragment`] - Fragment pool and fragment table
//! - [`packer`] - Per-file block/fragment streaming
//! - [`tree`] - Directory tree arena and file records
//! - [`walker`] - Depth-first traversal
//! - [`session`] - Run lifecycle (working directory, buffers, final flush)
//! - [`superblock`] - Image flags and block size limits
//! - [`xattr`] - Extended attribute namespace classification
//! - [`config`] - Packing options

pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod fragment;
pub mod io;
pub mod packer;
pub mod session;
pub mod superblock;
pub mod tree;
pub mod walker;
pub mod xattr;
