//! Packing session lifecycle
//!
//! A session switches into the pack directory, allocates the three block
//! sized buffers, walks the tree and writes the final fragment block. The
//! buffers are released before the working directory is restored, on every
//! path out of [`Session::run`].

use crate::compression::Compressor;
use crate::config::PackOptions;
use crate::error::{PackError, Result};
use crate::io::ImageWriter;
use crate::packer::{DataRegion, Packer};
use crate::tree::Tree;
use crate::walker::walk;
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Allocate a zeroed buffer, reporting failure instead of aborting
pub(crate) fn alloc_buffer(size: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| PackError::OutOfMemory { what, size })?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// The block sized working buffers of one run
#[derive(Debug)]
pub struct ScratchBuffers {
    /// Raw input staging
    pub(crate) block: Vec<u8>,
    /// Fragment accumulation
    pub(crate) fragment: Vec<u8>,
    /// Compressor output
    pub(crate) scratch: Vec<u8>,
}

impl ScratchBuffers {
    pub fn allocate(block_size: usize) -> Result<Self> {
        let block = alloc_buffer(block_size, "data block buffer")?;
        let fragment = alloc_buffer(block_size, "fragment buffer")?;
        let scratch = alloc_buffer(block_size, "scratch buffer")?;

        Ok(ScratchBuffers {
            block,
            fragment,
            scratch,
        })
    }
}

/// Scoped change of the process working directory
///
/// The previous directory is restored by [`WorkDir::restore`] or, failing
/// that, when the guard is dropped.
#[derive(Debug)]
pub struct WorkDir {
    previous: PathBuf,
    restored: bool,
}

impl WorkDir {
    pub fn push<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let previous = env::current_dir().map_err(|source| PackError::WorkDir {
            path: PathBuf::from("."),
            source,
        })?;

        env::set_current_dir(dir).map_err(|source| PackError::WorkDir {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!("Entered {:?} (was {:?})", dir, previous);

        Ok(WorkDir {
            previous,
            restored: false,
        })
    }

    /// Directory that will be restored
    pub fn previous(&self) -> &Path {
        &self.previous
    }

    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        env::set_current_dir(&self.previous).map_err(|source| PackError::WorkDir {
            path: self.previous.clone(),
            source,
        })?;
        debug!("Returned to {:?}", self.previous);
        Ok(())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = env::set_current_dir(&self.previous) {
            warn!("Failed to restore working directory {:?}: {}", self.previous, e);
        }
    }
}

/// One packing run over a tree
#[derive(Debug, Clone, Default)]
pub struct Session {
    options: PackOptions,
}

impl Session {
    pub fn new(options: PackOptions) -> Self {
        Session { options }
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Pack `tree` into `out` with the configured compressor
    pub fn run<W: Write>(&self, tree: &mut Tree, out: W) -> Result<DataRegion<ImageWriter<W>>> {
        let compressor = self.options.compression.build()?;
        self.run_with(tree, compressor, out)
    }

    /// Pack `tree` into `out` with a caller supplied compressor
    pub fn run_with<W: Write>(
        &self,
        tree: &mut Tree,
        compressor: Box<dyn Compressor>,
        out: W,
    ) -> Result<DataRegion<ImageWriter<W>>> {
        self.options.validate()?;
        info!(
            "Packing {} files, block size {}, compressor {}",
            tree.files().len(),
            self.options.block_size,
            compressor.method().name()
        );

        let workdir = match self.options.base_dir() {
            Some(dir) => Some(WorkDir::push(dir)?),
            None => None,
        };

        let result = self.pack(tree, compressor, out);

        if let Some(workdir) = workdir {
            match (&result, workdir.restore()) {
                (Ok(_), Err(e)) => return Err(e),
                (Err(_), Err(e)) => warn!("{}", e),
                _ => {}
            }
        }

        let region = result?;
        info!(
            "Wrote {} bytes: {} blocks, {} fragment blocks",
            region.bytes_used, region.stats.blocks, region.stats.fragment_blocks
        );
        Ok(region)
    }

    fn pack<W: Write>(
        &self,
        tree: &mut Tree,
        compressor: Box<dyn Compressor>,
        out: W,
    ) -> Result<DataRegion<ImageWriter<W>>> {
        let block_size = self.options.block_size;
        let buffers = ScratchBuffers::allocate(block_size as usize)?;
        let mut packer = Packer::with_buffers(block_size, compressor, ImageWriter::new(out), buffers);

        let mut stdout = io::stdout();
        let progress: Option<&mut dyn Write> = if self.options.quiet {
            None
        } else {
            Some(&mut stdout)
        };
        walk(tree, progress, &mut packer)?;

        let (_, files) = tree.split_mut();
        packer.finish(files)
    }
}
