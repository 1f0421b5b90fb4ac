//! Block/fragment packer
//!
//! Streams one file at a time into the image. Every full block is compressed
//! and appended on its own, with one size field recorded in the file's
//! block list. A shorter final chunk goes to the [`FragmentPool`] instead.
//!
//! Everything is written strictly in order; offsets are captured from the
//! sink's `bytes_used` at the moment they are needed and never revisited.

use crate::codec::SizeField;
use crate::compression::{BlockOutcome, Compressor};
use crate::error::{PackError, Result};
use crate::fragment::{FragmentPool, FragmentTable};
use crate::io::{read_retry, OutputSink};
use crate::session::ScratchBuffers;
use crate::superblock::{validate_block_size, ImageFlags};
use crate::tree::{FileId, FileRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use tracing::{debug, trace};

/// Counters collected while packing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStats {
    /// Regular files processed
    pub files: u64,
    /// Full data blocks written
    pub blocks: u64,
    /// Data blocks stored without compression
    pub raw_blocks: u64,
    /// Fragment blocks written
    pub fragment_blocks: u64,
    /// Fragment blocks stored without compression
    pub raw_fragment_blocks: u64,
    /// Bytes appended to the image
    pub bytes_used: u64,
}

/// Compress-and-append step shared by data and fragment blocks
pub(crate) struct BlockWriter<S: OutputSink> {
    pub(crate) sink: S,
    compressor: Box<dyn Compressor>,
    scratch: Vec<u8>,
    pub(crate) flags: ImageFlags,
    pub(crate) stats: PackStats,
}

impl<S: OutputSink> BlockWriter<S> {
    pub(crate) fn new(compressor: Box<dyn Compressor>, scratch: Vec<u8>, sink: S) -> Self {
        BlockWriter {
            sink,
            compressor,
            scratch,
            flags: ImageFlags::initial(),
            stats: PackStats::default(),
        }
    }

    /// Compress `data` and append whichever form the compressor chose
    ///
    /// Returns the offset the bytes were written at and their size field.
    pub(crate) fn emit(&mut self, data: &[u8]) -> Result<(u64, SizeField)> {
        let start = self.sink.bytes_used();

        let (bytes, size) = match self.compressor.compress_block(data, &mut self.scratch)? {
            BlockOutcome::Compressed(n) => {
                if n == 0 || n > self.scratch.len() {
                    return Err(PackError::Compressor(format!(
                        "compressed size {} outside 1..={}",
                        n,
                        self.scratch.len()
                    )));
                }
                (&self.scratch[..n], SizeField::encode(n, false)?)
            }
            BlockOutcome::StoreRaw => (data, SizeField::encode(data.len(), true)?),
        };

        self.sink.append(bytes)?;
        self.stats.bytes_used += bytes.len() as u64;
        Ok((start, size))
    }
}

/// Everything the packer produced, handed back by [`Packer::finish`]
#[derive(Debug)]
pub struct DataRegion<S> {
    /// The output sink, positioned after the last fragment block
    pub sink: S,
    /// Final value of the running write offset
    pub bytes_used: u64,
    /// Fragment table, one entry per fragment block
    pub fragments: FragmentTable,
    /// Image flags decided while packing
    pub flags: ImageFlags,
    pub stats: PackStats,
}

/// Per-image packing engine
pub struct Packer<S: OutputSink> {
    block_size: u32,
    block: Vec<u8>,
    out: BlockWriter<S>,
    pool: FragmentPool,
}

impl<S: OutputSink> Packer<S> {
    /// Allocate the scratch buffers and start packing into `sink`
    pub fn new(block_size: u32, compressor: Box<dyn Compressor>, sink: S) -> Result<Self> {
        validate_block_size(block_size)?;
        let buffers = ScratchBuffers::allocate(block_size as usize)?;
        Ok(Self::with_buffers(block_size, compressor, sink, buffers))
    }

    pub(crate) fn with_buffers(
        block_size: u32,
        compressor: Box<dyn Compressor>,
        sink: S,
        buffers: ScratchBuffers,
    ) -> Self {
        let ScratchBuffers {
            block,
            fragment,
            scratch,
        } = buffers;

        Packer {
            block_size,
            block,
            out: BlockWriter::new(compressor, scratch, sink),
            pool: FragmentPool::with_buffer(fragment),
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Current write offset
    pub fn bytes_used(&self) -> u64 {
        self.out.sink.bytes_used()
    }

    pub fn fragment_pool(&self) -> &FragmentPool {
        &self.pool
    }

    pub fn flags(&self) -> ImageFlags {
        self.out.flags
    }

    pub fn stats(&self) -> PackStats {
        self.out.stats
    }

    pub fn sink(&self) -> &S {
        &self.out.sink
    }

    /// Pack file `id`, reading its content from `input_path`
    pub fn process(&mut self, files: &mut [FileRecord], id: FileId) -> Result<()> {
        let path = files[id.index()].input_path.clone();
        let mut input = File::open(&path).map_err(|e| PackError::input(&path, e))?;
        self.process_reader(files, id, &mut input)
    }

    /// Pack file `id`, reading exactly `size` bytes from `input`
    pub fn process_reader<R: Read + ?Sized>(
        &mut self,
        files: &mut [FileRecord],
        id: FileId,
        input: &mut R,
    ) -> Result<()> {
        let block_size = self.block_size as usize;
        let record = &mut files[id.index()];
        let path = record.input_path.clone();

        record.start_block = self.out.sink.bytes_used();
        record.block_sizes.clear();
        record.fragment = None;
        record.fragment_offset = 0;

        let full_blocks = record.full_blocks(self.block_size) as usize;
        record
            .block_sizes
            .try_reserve_exact(full_blocks)
            .map_err(|_| PackError::OutOfMemory {
                what: "block size table",
                size: full_blocks.saturating_mul(std::mem::size_of::<SizeField>()),
            })?;

        trace!(
            "Packing {:?}: {} bytes from offset {}",
            path,
            record.size,
            record.start_block
        );

        let mut remaining = record.size;
        while remaining != 0 {
            let diff = remaining.min(block_size as u64) as usize;

            let got = read_retry(input, &mut self.block[..diff])
                .map_err(|e| PackError::input(&path, e))?;
            if got < diff {
                return Err(PackError::TruncatedRead {
                    path,
                    expected: diff,
                    actual: got,
                });
            }

            if diff < block_size {
                self.pool
                    .add(&mut self.out, files, id, &self.block[..diff])?;
            } else {
                let (_, size) = self.out.emit(&self.block)?;
                self.out.stats.blocks += 1;
                if size.is_raw() {
                    self.out.stats.raw_blocks += 1;
                }
                files[id.index()].block_sizes.push(size);
            }

            remaining -= diff as u64;
        }

        self.out.stats.files += 1;
        Ok(())
    }

    /// Write out whatever tails are staged
    pub fn flush_fragments(&mut self, files: &mut [FileRecord]) -> Result<Option<u32>> {
        self.pool.flush(&mut self.out, files)
    }

    /// Flush the last fragment block and release the scratch buffers
    pub fn finish(mut self, files: &mut [FileRecord]) -> Result<DataRegion<S>> {
        self.flush_fragments(files)?;

        let Packer { out, pool, .. } = self;
        let BlockWriter {
            sink, flags, stats, ..
        } = out;

        debug!(
            "Data region complete: {} files, {} blocks, {} fragment blocks, {} bytes",
            stats.files,
            stats.blocks,
            stats.fragment_blocks,
            sink.bytes_used()
        );

        Ok(DataRegion {
            bytes_used: sink.bytes_used(),
            sink,
            fragments: pool.into_table(),
            flags,
            stats,
        })
    }
}
