//! Output-file patching.
//!
//! Given an output file that already holds a verbatim copy of the source,
//! overwrite the encrypted byte range with the plaintext observed in memory
//! and clear the descriptor's encryption flag. Both writes are positioned and
//! independent of the file cursor. The plaintext region is always written
//! before the flag is cleared, so an interrupted run never leaves a file
//! marked decrypted while still holding ciphertext.

use std::fs::File;
use std::os::unix::fs::FileExt;

use tracing::{debug, warn};

use crate::error::Result;
use crate::image::MemoryImage;
use crate::macho::EncryptionInfoCommand;
use crate::scanner::EncryptionInfo;

/// The byte ranges in the output file affected by one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRegion {
    /// Absolute file offset of the encrypted range
    pub file_offset: u64,
    /// Length of the encrypted range
    pub len: u64,
    /// Absolute file offset of the 4-byte cryptid field
    pub cryptid_offset: u64,
}

impl PatchRegion {
    /// Translates a descriptor's header-relative offsets into absolute file
    /// offsets using the resolved slice offset (0 for thin binaries).
    pub fn locate(info: &EncryptionInfo, slice_offset: u64) -> Self {
        Self {
            file_offset: slice_offset + info.cryptoff as u64,
            len: info.cryptsize as u64,
            cryptid_offset: slice_offset
                + info.command_offset
                + EncryptionInfoCommand::CRYPTID_FIELD_OFFSET,
        }
    }
}

/// Outcome of patching one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    /// Plaintext written and flag cleared in full
    Patched,
    /// At least one positioned write was short or failed; a warning was logged
    Partial,
    /// The descriptor's flag was already clear; the file was not touched
    AlreadyClear,
}

/// Patches one encryption descriptor into `output`.
///
/// A descriptor whose `cryptid` is already zero is a strict no-op. Short or
/// failed positioned writes are logged and reported as [`PatchStatus::Partial`]
/// rather than aborting, recovering as much plaintext as possible. The only
/// error path is a descriptor range that falls outside the memory view.
pub fn apply(
    output: &File,
    image: &MemoryImage,
    info: &EncryptionInfo,
    slice_offset: u64,
) -> Result<PatchStatus> {
    if info.cryptid == 0 {
        debug!(
            "descriptor at {:#x} already clear, leaving untouched",
            info.command_offset
        );
        return Ok(PatchStatus::AlreadyClear);
    }

    let region = PatchRegion::locate(info, slice_offset);
    let plaintext = image.read_at(info.cryptoff as u64, info.cryptsize as u64)?;

    let mut partial = false;
    match output.write_at(plaintext, region.file_offset) {
        Ok(written) if written == plaintext.len() => {}
        Ok(written) => {
            warn!(
                "short write of plaintext region at {:#x}: {} of {} bytes",
                region.file_offset,
                written,
                plaintext.len()
            );
            partial = true;
        }
        Err(e) => {
            warn!(
                "failed to write plaintext region at {:#x}: {}",
                region.file_offset, e
            );
            partial = true;
        }
    }

    let zero = 0u32.to_le_bytes();
    match output.write_at(&zero, region.cryptid_offset) {
        Ok(written) if written == zero.len() => {}
        Ok(written) => {
            warn!(
                "short write clearing cryptid at {:#x}: {} of {} bytes",
                region.cryptid_offset,
                written,
                zero.len()
            );
            partial = true;
        }
        Err(e) => {
            warn!(
                "failed to clear cryptid at {:#x}: {}",
                region.cryptid_offset, e
            );
            partial = true;
        }
    }

    if partial {
        Ok(PatchStatus::Partial)
    } else {
        debug!(
            "patched [{:#x}, {:#x}) and cleared cryptid at {:#x}",
            region.file_offset,
            region.file_offset + region.len,
            region.cryptid_offset
        );
        Ok(PatchStatus::Patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use zerocopy::IntoBytes;

    const CRYPTOFF: u32 = 0x40;
    const CRYPTSIZE: u32 = 0x20;
    const COMMAND_OFFSET: u64 = MachHeader64::SIZE as u64;

    fn memory_with_descriptor(cryptid: u32) -> Vec<u8> {
        let mut data = vec![0u8; 0x100];
        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: CPU_TYPE_ARM64,
            cpusubtype: CPU_SUBTYPE_ARM64_ALL,
            filetype: MH_EXECUTE,
            ncmds: 1,
            sizeofcmds: EncryptionInfoCommand::SIZE as u32,
            flags: 0,
            reserved: 0,
        };
        let enc = EncryptionInfoCommand {
            cmd: LC_ENCRYPTION_INFO,
            cmdsize: EncryptionInfoCommand::SIZE as u32,
            cryptoff: CRYPTOFF,
            cryptsize: CRYPTSIZE,
            cryptid,
        };
        data[..MachHeader64::SIZE].copy_from_slice(header.as_bytes());
        data[MachHeader64::SIZE..MachHeader64::SIZE + EncryptionInfoCommand::SIZE]
            .copy_from_slice(enc.as_bytes());
        // Plaintext pattern at the encrypted range
        for b in &mut data[CRYPTOFF as usize..(CRYPTOFF + CRYPTSIZE) as usize] {
            *b = 0xAA;
        }
        data
    }

    fn output_file(len: usize) -> std::fs::File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&vec![0xCCu8; len]).unwrap();
        file
    }

    fn read_back(file: &mut std::fs::File) -> Vec<u8> {
        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut contents).unwrap();
        contents
    }

    #[test]
    fn test_locate_translates_by_slice_offset() {
        let info = EncryptionInfo {
            cryptoff: 32,
            cryptsize: 16,
            cryptid: 1,
            command_offset: COMMAND_OFFSET,
        };
        let region = PatchRegion::locate(&info, 8192);
        assert_eq!(region.file_offset, 8224);
        assert_eq!(region.len, 16);
        assert_eq!(region.cryptid_offset, 8192 + COMMAND_OFFSET + 16);
    }

    #[test]
    fn test_apply_writes_region_and_clears_flag() {
        let memory = memory_with_descriptor(1);
        let image = MemoryImage::new(0, &memory).unwrap();
        let info = crate::scanner::encryption_commands(&image).next().unwrap();

        let mut file = output_file(0x100);
        let status = apply(&file, &image, &info, 0).unwrap();
        assert_eq!(status, PatchStatus::Patched);

        let contents = read_back(&mut file);
        assert!(contents[CRYPTOFF as usize..(CRYPTOFF + CRYPTSIZE) as usize]
            .iter()
            .all(|&b| b == 0xAA));
        let cryptid_at = (COMMAND_OFFSET + 16) as usize;
        assert_eq!(&contents[cryptid_at..cryptid_at + 4], &[0, 0, 0, 0]);
        // Bytes outside both ranges untouched
        assert_eq!(contents[0], 0xCC);
        assert_eq!(contents[(CRYPTOFF + CRYPTSIZE) as usize], 0xCC);
    }

    #[test]
    fn test_apply_clear_descriptor_is_noop() {
        let memory = memory_with_descriptor(0);
        let image = MemoryImage::new(0, &memory).unwrap();
        let info = crate::scanner::encryption_commands(&image).next().unwrap();

        let mut file = output_file(0x100);
        let status = apply(&file, &image, &info, 0).unwrap();
        assert_eq!(status, PatchStatus::AlreadyClear);

        let status = apply(&file, &image, &info, 0).unwrap();
        assert_eq!(status, PatchStatus::AlreadyClear);

        let contents = read_back(&mut file);
        assert!(contents.iter().all(|&b| b == 0xCC));
    }

    #[test]
    fn test_apply_out_of_range_descriptor_is_recoverable() {
        let memory = memory_with_descriptor(1);
        let image = MemoryImage::new(0, &memory).unwrap();
        let info = EncryptionInfo {
            cryptoff: 0x1000,
            cryptsize: 0x1000,
            cryptid: 1,
            command_offset: COMMAND_OFFSET,
        };

        let mut file = output_file(0x100);
        let err = apply(&file, &image, &info, 0).unwrap_err();
        assert!(err.is_recoverable());
        // Nothing was written before the precondition failed
        let contents = read_back(&mut file);
        assert!(contents.iter().all(|&b| b == 0xCC));
    }
}
