//! Per-image dump orchestration.
//!
//! For each loaded image the driver opens the on-disk source, resolves the
//! matching container slice, copies the whole file verbatim into the output,
//! then patches every encryption descriptor found in the command table.
//! Images are processed strictly one at a time, each to completion; the only
//! state that crosses image boundaries is the diagnostic counter block.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::container;
use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::patch::{self, PatchStatus};
use crate::scanner;

/// One loaded image as supplied by the host process.
#[derive(Debug, Clone)]
pub struct LoadedImage<'a> {
    /// Best-effort on-disk path of the image; may be unresolvable
    pub path: Option<PathBuf>,
    /// The image's bytes as currently resident in memory
    pub memory: MemoryImage<'a>,
}

/// Where the dumped file(s) go.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Single-image mode: write the main image to exactly this path
    File(PathBuf),
    /// Multi-image mode: write every image into this directory, which is
    /// created if absent, under its source file name
    Directory(PathBuf),
}

/// Diagnostic counters accumulated across a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    /// Images fully processed
    pub images_processed: u32,
    /// Images benignly skipped (no backing file on disk)
    pub images_skipped: u32,
    /// Descriptors whose range was patched and flag cleared
    pub regions_patched: u32,
    /// Descriptors whose flag was already clear
    pub regions_already_clear: u32,
    /// Positioned writes that were short or failed
    pub short_writes: u32,
    /// Descriptors skipped because their range exceeded the memory view
    pub regions_unreadable: u32,
}

impl fmt::Display for DumpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} image(s) processed, {} skipped, {} region(s) patched, {} already clear, {} short write(s), {} unreadable",
            self.images_processed,
            self.images_skipped,
            self.regions_patched,
            self.regions_already_clear,
            self.short_writes,
            self.regions_unreadable
        )
    }
}

/// Runs the dump pipeline against `target`.
///
/// [`OutputTarget::File`] processes the first image (the process's main
/// binary) to exactly that path; [`OutputTarget::Directory`] processes every
/// image in order. Returns the accumulated counters, or the first fatal
/// error.
pub fn process(images: &[LoadedImage<'_>], target: &OutputTarget) -> Result<DumpStats> {
    match target {
        OutputTarget::File(path) => {
            info!("single-image mode, output {}", path.display());
            match images.first() {
                Some(image) => dump_image(image, path),
                None => {
                    warn!("no loaded images supplied");
                    Ok(DumpStats::default())
                }
            }
        }
        OutputTarget::Directory(dir) => {
            info!(
                "multi-image mode, {} image(s), output directory {}",
                images.len(),
                dir.display()
            );
            dump_all(images, dir)
        }
    }
}

/// Dumps a single image to exactly `output_path`.
///
/// The image must have a resolvable on-disk path; in single-image mode a
/// missing source is fatal, not a skip.
pub fn dump_image(image: &LoadedImage<'_>, output_path: &Path) -> Result<DumpStats> {
    let source = image.path.as_deref().ok_or(Error::MissingSourcePath {
        base: image.memory.base(),
    })?;

    let mut stats = DumpStats::default();
    dump_one(source, output_path, &image.memory, &mut stats)?;
    info!("{}", stats);
    Ok(stats)
}

/// Dumps every image into `output_dir`, one at a time.
///
/// An image whose source file does not exist on disk is logged and skipped;
/// any other failure aborts the run.
pub fn dump_all(images: &[LoadedImage<'_>], output_dir: &Path) -> Result<DumpStats> {
    fs::create_dir_all(output_dir).map_err(|e| Error::DirCreate {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let mut stats = DumpStats::default();
    for image in images {
        let source = match image.path.as_deref() {
            Some(path) => path,
            None => {
                warn!(
                    "image at {:#x} has no resolvable path, skipping",
                    image.memory.base()
                );
                stats.images_skipped += 1;
                continue;
            }
        };

        match fs::metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} has no backing file on disk, skipping", source.display());
                stats.images_skipped += 1;
                continue;
            }
            Err(e) => {
                return Err(Error::FileStat {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        }

        let file_name = match source.file_name() {
            Some(name) => name,
            None => {
                warn!("{} has no file name, skipping", source.display());
                stats.images_skipped += 1;
                continue;
            }
        };

        let output_path = output_dir.join(file_name);
        dump_one(source, &output_path, &image.memory, &mut stats)?;
    }

    info!("{}", stats);
    Ok(stats)
}

/// Processes one image: open, resolve, copy, patch.
fn dump_one(
    source: &Path,
    output_path: &Path,
    memory: &MemoryImage<'_>,
    stats: &mut DumpStats,
) -> Result<()> {
    info!(
        "dumping {} ({}) to {}",
        source.display(),
        memory.header(),
        output_path.display()
    );

    let mut input = File::open(source).map_err(|e| Error::FileOpen {
        path: source.to_path_buf(),
        source: e,
    })?;

    // Resolved before the output is created, so an unrecognized source format
    // leaves nothing behind on disk.
    let slice = container::resolve_slice(&mut input, memory)?;

    let mut output = File::create(output_path).map_err(|e| Error::FileWrite {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    // Verbatim baseline; the resolver left the input cursor at 0.
    io::copy(&mut input, &mut output).map_err(|e| Error::FileWrite {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    for descriptor in scanner::encryption_commands(memory) {
        match patch::apply(&output, memory, &descriptor, slice.file_offset) {
            Ok(PatchStatus::Patched) => stats.regions_patched += 1,
            Ok(PatchStatus::Partial) => {
                stats.regions_patched += 1;
                stats.short_writes += 1;
            }
            Ok(PatchStatus::AlreadyClear) => stats.regions_already_clear += 1,
            Err(e) if e.is_recoverable() => {
                warn!(
                    "skipping descriptor at {:#x} in {}: {}",
                    descriptor.command_offset,
                    source.display(),
                    e
                );
                stats.regions_unreadable += 1;
            }
            Err(e) => return Err(e),
        }
    }

    stats.images_processed += 1;
    Ok(())
}
