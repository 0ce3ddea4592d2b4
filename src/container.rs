//! Container resolution.
//!
//! An on-disk binary is either a thin Mach-O or a fat container holding one
//! slice per architecture. Patch offsets are relative to the slice that is
//! actually loaded in memory, so the resolver locates that slice by comparing
//! each candidate's on-disk primary header byte-for-byte against the
//! in-memory header. Fat bookkeeping is big-endian on disk regardless of host
//! byte order; thin magics are native order.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;
use zerocopy::FromBytes;

use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::macho::{
    FatArch, FatArch64, FatHeader, MachHeader64, FAT_MAGIC, FAT_MAGIC_64, MH_MAGIC, MH_MAGIC_64,
};
use crate::util::{read_u32_be, read_u32_le};

/// The decoded outer container variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A single thin binary
    Thin,
    /// A fat container with 32-bit slice descriptors
    Fat,
    /// A fat container with 64-bit slice descriptors
    Fat64,
}

/// The slice within the on-disk file that corresponds to the loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlice {
    /// Byte offset of the slice's primary header within the file
    pub file_offset: u64,
    /// Which container variant was decoded
    pub kind: ContainerKind,
}

/// Resolves the file offset of the slice matching `image`.
///
/// Thin binaries resolve to offset 0 without scanning. For fat containers the
/// slice descriptors are walked in order and the first candidate whose on-disk
/// header equals the in-memory header byte-for-byte wins; exhausting the list
/// is fatal, as is an unrecognized magic. The read cursor is restored to the
/// start of the file before returning so the caller's verbatim copy sees the
/// whole file.
pub fn resolve_slice<R: Read + Seek>(input: &mut R, image: &MemoryImage) -> Result<ResolvedSlice> {
    input.seek(SeekFrom::Start(0))?;

    let mut raw = [0u8; FatHeader::SIZE];
    input.read_exact(&mut raw)?;

    let kind = match read_u32_be(&raw) {
        FAT_MAGIC => ContainerKind::Fat,
        FAT_MAGIC_64 => ContainerKind::Fat64,
        _ => match read_u32_le(&raw) {
            MH_MAGIC | MH_MAGIC_64 => {
                input.seek(SeekFrom::Start(0))?;
                return Ok(ResolvedSlice {
                    file_offset: 0,
                    kind: ContainerKind::Thin,
                });
            }
            other => return Err(Error::UnknownMagic(other)),
        },
    };

    let header = FatHeader::read_from_bytes(&raw).map_err(|_| Error::BufferTooSmall {
        needed: FatHeader::SIZE,
        available: raw.len(),
    })?;
    let count = header.arch_count();
    debug!(
        "fat container ({:?}) with {} slices, matching {}",
        kind,
        count,
        image.header()
    );

    let file_offset = if kind == ContainerKind::Fat {
        scan_slices(input, image, count, FatArch::SIZE, |raw| {
            let arch = FatArch::read_from_bytes(raw).map_err(|_| Error::BufferTooSmall {
                needed: FatArch::SIZE,
                available: raw.len(),
            })?;
            Ok(arch.offset())
        })?
    } else {
        scan_slices(input, image, count, FatArch64::SIZE, |raw| {
            let arch = FatArch64::read_from_bytes(raw).map_err(|_| Error::BufferTooSmall {
                needed: FatArch64::SIZE,
                available: raw.len(),
            })?;
            Ok(arch.offset())
        })?
    };

    match file_offset {
        Some(file_offset) => {
            input.seek(SeekFrom::Start(0))?;
            debug!("loaded slice found at file offset {:#x}", file_offset);
            Ok(ResolvedSlice { file_offset, kind })
        }
        None => Err(Error::SliceNotFound {
            arch: image.header().arch_name(),
            count,
        }),
    }
}

/// Walks `count` slice descriptors of `entry_size` bytes each, returning the
/// offset of the first slice whose on-disk header matches the in-memory one.
fn scan_slices<R: Read + Seek>(
    input: &mut R,
    image: &MemoryImage,
    count: u32,
    entry_size: usize,
    slice_offset: impl Fn(&[u8]) -> Result<u64>,
) -> Result<Option<u64>> {
    let snapshot_len = image.header().size();
    debug_assert!(snapshot_len <= MachHeader64::SIZE);
    debug_assert!(entry_size <= FatArch64::SIZE);

    for index in 0..count {
        let mut raw = [0u8; FatArch64::SIZE];
        input.read_exact(&mut raw[..entry_size])?;
        let candidate = slice_offset(&raw[..entry_size])?;

        let mut snapshot = [0u8; MachHeader64::SIZE];
        let next_entry = input.stream_position()?;
        input.seek(SeekFrom::Start(candidate))?;
        input.read_exact(&mut snapshot[..snapshot_len])?;
        input.seek(SeekFrom::Start(next_entry))?;

        if &snapshot[..snapshot_len] == image.header_bytes() {
            return Ok(Some(candidate));
        }
        debug!("slice {} at {:#x} does not match", index, candidate);
    }

    Ok(None)
}
