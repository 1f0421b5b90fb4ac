//! # sqfs-pack - SquashFS-style data region packing
//!
//! `sqfs-pack` writes the data region of a read-only compressed filesystem
//! image. Every regular file is split into fixed-size blocks which are
//! compressed (or stored raw when compression does not pay off) and
//! appended in one sequential pass. The trailing partial block of each file
//! is coalesced with other files' tails into shared *fragment blocks*.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqfs_pack::{pack_directory, PackOptions, Result};
//! use std::fs::File;
//!
//! # fn main() -> Result<()> {
//! let out = File::create("rootfs.data")?;
//! let options = PackOptions::builder().block_size(128 * 1024).quiet(true).build()?;
//!
//! let image = pack_directory("rootfs", out, &options)?;
//! println!("{} bytes, {} fragment blocks", image.region.bytes_used, image.region.fragments.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower level
//!
//! ```rust,no_run
//! use sqfs_pack::{CompressionConfig, ImageWriter, Packer, Result, Tree};
//!
//! # fn main() -> Result<()> {
//! let mut tree = Tree::new();
//! let node = tree.add_file(tree.root(), "hello.txt", "/tmp/hello.txt", 13)?;
//! let id = tree.file_id(node).unwrap();
//!
//! let compressor = CompressionConfig::zstd().build()?;
//! let mut packer = Packer::new(4096, compressor, ImageWriter::new(Vec::new()))?;
//!
//! let (_, files) = tree.split_mut();
//! packer.process(files, id)?;
//! let _region = packer.finish(files)?;
//! assert_eq!(tree.file(id).fragment, Some(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ file A block 0 │ file A block 1 │ ...       │  size fields in file A's record
//! ├─────────────────────────────────────────────┤
//! │ file B block 0 │ ...                        │
//! ├─────────────────────────────────────────────┤
//! │ fragment block 0: tail A | tail B | tail C  │  fragment table entry 0
//! ├─────────────────────────────────────────────┤
//! │ ...                                         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    codec, compression, config, error, fragment, io, packer, session, superblock, tree, walker,
    xattr,
};

pub use crate::core::{
    codec::{SizeField, MAX_ENCODED_LEN, UNCOMPRESSED_BIT},
    compression::{
        BlockOutcome, CompressionConfig, CompressionMethod, Compressor, Lz4Compressor,
        NoCompression, ZstdCompressor,
    },
    config::{PackOptions, PackOptionsBuilder},
    error::{PackError, Result},
    fragment::{FragmentEntry, FragmentPool, FragmentTable, FRAGMENT_ENTRY_SIZE},
    io::{ImageWriter, OutputSink},
    packer::{DataRegion, PackStats, Packer},
    session::{Session, WorkDir},
    superblock::{ImageFlags, DEFAULT_BLOCK_SIZE},
    tree::{FileId, FileRecord, Node, NodeId, NodeKind, Tree},
    walker::{walk, FileVisitor},
    xattr::{classify, prefix_of, XattrType},
};

use std::io::Write;
use std::path::Path;
use tracing::info;

/// Result of [`pack_directory`]
#[derive(Debug)]
pub struct PackedImage<W: Write> {
    /// The scanned tree, with every file record filled in
    pub tree: Tree,
    /// Output and fragment table
    pub region: DataRegion<ImageWriter<W>>,
}

/// Scan `source` and pack every regular file below it into `out`
///
/// `source` becomes the pack directory for the run regardless of
/// `options.pack_dir`, since the scanned input paths are relative to it.
pub fn pack_directory<P: AsRef<Path>, W: Write>(
    source: P,
    out: W,
    options: &PackOptions,
) -> Result<PackedImage<W>> {
    let source = source.as_ref();
    info!("Packing directory {:?}", source);

    let mut tree = Tree::scan(source)?;

    let mut options = options.clone();
    options.pack_dir = Some(source.to_path_buf());
    let region = Session::new(options).run(&mut tree, out)?;

    Ok(PackedImage { tree, region })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::CWD_LOCK;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pack_directory_raw() {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("bin")).unwrap();
        fs::write(temp.path().join("bin/tool"), vec![0xAAu8; 10]).unwrap();
        fs::write(temp.path().join("readme"), b"abc").unwrap();

        let options = PackOptions::builder()
            .block_size(4)
            .compression(CompressionConfig::none())
            .quiet(true)
            .build()
            .unwrap();
        let image = pack_directory(temp.path(), Vec::new(), &options).unwrap();

        let tool = image.tree.file(image.tree.file_id(image.tree.lookup("bin/tool").unwrap()).unwrap());
        assert_eq!(tool.start_block, 0);
        assert_eq!(tool.block_sizes.len(), 2);
        assert_eq!(tool.fragment, Some(0));
        assert_eq!(tool.fragment_offset, 0);

        let readme = image.tree.file(image.tree.file_id(image.tree.lookup("readme").unwrap()).unwrap());
        assert_eq!(readme.start_block, 8);
        assert!(readme.block_sizes.is_empty());
        // 2 byte tail of bin/tool + 3 bytes of readme overflow one 4 byte fragment block
        assert_eq!(readme.fragment, Some(1));
        assert_eq!(readme.fragment_offset, 0);

        let mut expected = vec![0xAAu8; 10];
        expected.extend_from_slice(b"abc");
        assert_eq!(image.region.sink.get_ref(), &expected);
        assert_eq!(image.region.fragments.len(), 2);
        assert_eq!(image.region.fragments.get(1).unwrap().start_offset, 10);
    }
}
