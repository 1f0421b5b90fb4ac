use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Invalid block size: {0} (must be between 1 and 16777215 bytes)")]
    InvalidBlockSize(u32),

    #[error("Length {0} does not fit in a 24 bit size field")]
    SizeOverflow(usize),

    #[error("{}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: truncated read (expected {expected} bytes, got {actual})", path.display())]
    TruncatedRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Writing to output file: {0}")]
    Output(#[source] std::io::Error),

    #[error("Write to output file truncated ({written} of {expected} bytes)")]
    TruncatedWrite { expected: usize, written: usize },

    #[error("Out of memory allocating {what} ({size} bytes)")]
    OutOfMemory { what: &'static str, size: usize },

    #[error("Compressor failure: {0}")]
    Compressor(String),

    #[error("Unsupported extended attribute key: {0}")]
    UnsupportedXattrKey(String),

    #[error("Changing working directory to {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackError {
    /// Build an input error for `path`
    pub(crate) fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Input {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
