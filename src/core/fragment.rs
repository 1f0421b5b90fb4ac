//! Fragment packing
//!
//! The trailing partial block of each file is not written as its own block.
//! Tails from several files are copied into a shared buffer of one block and
//! written together as a *fragment block* when the buffer cannot take the
//! next tail (or when packing ends). Each fragment block gets one entry in
//! the fragment table; every file whose tail went into it is pointed at that
//! entry by index, plus the byte offset of its tail inside the block.
//!
//! Fragment indices are assigned lazily: while a tail sits in the buffer its
//! file is only listed as *pending*. On flush all pending files receive the
//! index of the entry being appended, i.e. the table length before the push.

use crate::codec::SizeField;
use crate::error::{PackError, Result};
use crate::io::OutputSink;
use crate::packer::BlockWriter;
use crate::tree::{FileId, FileRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Size of a serialized fragment table entry
pub const FRAGMENT_ENTRY_SIZE: usize = 16;

/// Capacity of the fragment table after its first growth
pub const INITIAL_FRAGMENT_CAPACITY: usize = 16;

/// Fragment table entry
///
/// # Layout
///
/// ```text
/// Bytes 0-7:   start offset of the fragment block in the image (LE)
/// Bytes 8-11:  size field (LE)
/// Bytes 12-15: unused, always zero
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentEntry {
    pub start_offset: u64,
    pub size: SizeField,
    pub pad: u32,
}

impl FragmentEntry {
    pub fn new(start_offset: u64, size: SizeField) -> Self {
        FragmentEntry {
            start_offset,
            size,
            pad: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAGMENT_ENTRY_SIZE] {
        let mut bytes = [0u8; FRAGMENT_ENTRY_SIZE];
        bytes[0..8].copy_from_slice(&self.start_offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.pad.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAGMENT_ENTRY_SIZE {
            return Err(PackError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for fragment entry",
            )));
        }

        let mut start = [0u8; 8];
        start.copy_from_slice(&bytes[0..8]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[8..12]);
        let mut pad = [0u8; 4];
        pad.copy_from_slice(&bytes[12..16]);

        Ok(FragmentEntry {
            start_offset: u64::from_le_bytes(start),
            size: SizeField::from_raw(u32::from_le_bytes(size)),
            pad: u32::from_le_bytes(pad),
        })
    }
}

/// Append-only fragment table
///
/// Grows by doubling, starting at [`INITIAL_FRAGMENT_CAPACITY`]. Entries
/// never move or change once pushed, so an index handed out stays valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentTable {
    entries: Vec<FragmentEntry>,
}

impl FragmentTable {
    pub fn new() -> Self {
        FragmentTable {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn get(&self, index: u32) -> Option<&FragmentEntry> {
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[FragmentEntry] {
        &self.entries
    }

    /// Make sure the next push cannot reallocate
    pub(crate) fn reserve_slot(&mut self) -> Result<()> {
        if self.entries.len() < self.entries.capacity() {
            return Ok(());
        }

        let new_capacity = if self.entries.capacity() == 0 {
            INITIAL_FRAGMENT_CAPACITY
        } else {
            self.entries.capacity() * 2
        };

        self.entries
            .try_reserve_exact(new_capacity - self.entries.len())
            .map_err(|_| PackError::OutOfMemory {
                what: "fragment table",
                size: new_capacity * FRAGMENT_ENTRY_SIZE,
            })?;
        trace!("Fragment table grown to {} entries", self.entries.capacity());
        Ok(())
    }

    /// Append an entry and return its index
    pub(crate) fn push(&mut self, entry: FragmentEntry) -> Result<u32> {
        self.reserve_slot()?;
        let index = self.entries.len() as u32;
        self.entries.push(entry);
        Ok(index)
    }

    /// Serialize all entries back to back
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.entries.len() * FRAGMENT_ENTRY_SIZE);
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes
    }
}

/// Staging buffer for file tails
#[derive(Debug)]
pub struct FragmentPool {
    buffer: Vec<u8>,
    fill: usize,
    pending: Vec<FileId>,
    table: FragmentTable,
}

impl FragmentPool {
    /// Create a pool around a block sized buffer
    pub(crate) fn with_buffer(buffer: Vec<u8>) -> Self {
        FragmentPool {
            buffer,
            fill: 0,
            pending: Vec::new(),
            table: FragmentTable::new(),
        }
    }

    /// Bytes currently staged
    pub fn fill(&self) -> usize {
        self.fill
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0 && self.pending.is_empty()
    }

    /// Files whose tails are staged but not yet flushed
    pub fn pending(&self) -> &[FileId] {
        &self.pending
    }

    /// Staged bytes
    pub fn staged(&self) -> &[u8] {
        &self.buffer[..self.fill]
    }

    pub fn table(&self) -> &FragmentTable {
        &self.table
    }

    pub(crate) fn into_table(self) -> FragmentTable {
        self.table
    }

    /// Stage the tail of file `id`, flushing first if it would not fit
    pub(crate) fn add<S: OutputSink>(
        &mut self,
        out: &mut BlockWriter<S>,
        files: &mut [FileRecord],
        id: FileId,
        data: &[u8],
    ) -> Result<()> {
        debug_assert!(data.len() < self.buffer.len());

        if self.fill + data.len() > self.buffer.len() {
            self.flush(out, files)?;
        }

        let record = &mut files[id.index()];
        record.fragment_offset = self.fill as u32;
        record.fragment = None;
        self.pending.push(id);

        self.buffer[self.fill..self.fill + data.len()].copy_from_slice(data);
        self.fill += data.len();
        trace!(
            "Staged {} byte tail of {:?} (fill {}/{})",
            data.len(),
            record.input_path,
            self.fill,
            self.buffer.len()
        );
        Ok(())
    }

    /// Write the staged tails as one fragment block
    ///
    /// Returns the index of the new table entry, or `None` if nothing was
    /// staged.
    pub(crate) fn flush<S: OutputSink>(
        &mut self,
        out: &mut BlockWriter<S>,
        files: &mut [FileRecord],
    ) -> Result<Option<u32>> {
        if self.is_empty() {
            return Ok(None);
        }

        self.table.reserve_slot()?;

        let (start_offset, size) = out.emit(&self.buffer[..self.fill])?;
        let index = self.table.push(FragmentEntry::new(start_offset, size))?;

        for id in &self.pending {
            files[id.index()].fragment = Some(index);
        }

        debug!(
            "Fragment block {} at offset {}: {} tails, {} bytes staged, {} on disk{}",
            index,
            start_offset,
            self.pending.len(),
            self.fill,
            size.len(),
            if size.is_raw() { " (raw)" } else { "" }
        );

        out.stats.fragment_blocks += 1;
        if size.is_raw() {
            out.stats.raw_fragment_blocks += 1;
        }
        out.flags.mark_fragments_used();

        self.buffer.fill(0);
        self.fill = 0;
        self.pending.clear();
        Ok(Some(index))
    }
}
