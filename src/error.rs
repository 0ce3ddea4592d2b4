//! Error types for the decrypted-image dumper.
//!
//! This module provides error handling for all dump operations, including
//! container resolution, load-command scanning, and output patching.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for dump operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stat file '{path}': {source}")]
    FileStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory '{path}': {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==================== Container Errors ====================
    #[error("unrecognized container magic: {0:#010x}")]
    UnknownMagic(u32),

    #[error("fat container has no slice matching the loaded {arch} image ({count} slices scanned)")]
    SliceNotFound { arch: &'static str, count: u32 },

    // ==================== Mach-O Errors ====================
    #[error("invalid Mach-O magic: {0:#010x}")]
    InvalidMachoMagic(u32),

    #[error("memory read of {len} bytes at offset {offset:#x} exceeds image extent ({extent:#x})")]
    MemoryOutOfBounds {
        offset: u64,
        len: u64,
        extent: usize,
    },

    // ==================== Image Errors ====================
    #[error("loaded image at {base:#x} has no resolvable on-disk path")]
    MissingSourcePath { base: u64 },

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// A specialized Result type for dump operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error indicates a recoverable condition.
    ///
    /// A descriptor whose byte range falls outside the supplied memory view
    /// is logged as a warning and skipped rather than aborting the run.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MemoryOutOfBounds { .. })
    }

    /// Creates an out-of-bounds memory read error.
    #[inline]
    pub fn memory_out_of_bounds(offset: u64, len: u64, extent: usize) -> Self {
        Error::MemoryOutOfBounds {
            offset,
            len,
            extent,
        }
    }
}
