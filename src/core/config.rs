//! Packing options
//!
//! Options can be built in code through [`PackOptionsBuilder`] or loaded from
//! a TOML file:
//!
//! ```toml
//! block_size = 131072
//! pack_dir = "rootfs"
//! quiet = true
//!
//! [compression]
//! method = "zstd"
//! level = 19
//! threshold = 128
//! ```

use crate::compression::CompressionConfig;
use crate::error::Result;
use crate::superblock::{validate_block_size, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for one packing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Data block size in bytes
    pub block_size: u32,

    /// Block compressor settings
    pub compression: CompressionConfig,

    /// Directory that relative input paths are resolved against
    pub pack_dir: Option<PathBuf>,

    /// Path the tree description was read from; its directory is used when
    /// no `pack_dir` is given
    pub input: Option<PathBuf>,

    /// Suppress the per-file progress lines
    pub quiet: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionConfig::default(),
            pack_dir: None,
            input: None,
            quiet: false,
        }
    }
}

impl PackOptions {
    pub fn builder() -> PackOptionsBuilder {
        PackOptionsBuilder::new()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: PackOptions = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }

    /// Directory the run should switch into, if any
    pub fn base_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.pack_dir {
            return Some(dir.clone());
        }

        self.input
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

/// Builder for [`PackOptions`]
#[derive(Debug, Default)]
pub struct PackOptionsBuilder {
    options: PackOptions,
}

impl PackOptionsBuilder {
    pub fn new() -> Self {
        PackOptionsBuilder {
            options: PackOptions::default(),
        }
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.options.block_size = block_size;
        self
    }

    pub fn compression(mut self, compression: CompressionConfig) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn pack_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.pack_dir = Some(dir.into());
        self
    }

    pub fn input<P: Into<PathBuf>>(mut self, input: P) -> Self {
        self.options.input = Some(input.into());
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.options.quiet = quiet;
        self
    }

    /// Validate and return the options
    pub fn build(self) -> Result<PackOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
