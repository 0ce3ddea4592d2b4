//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files. Thin header and
//! load-command fields are little-endian; fat container fields are big-endian
//! and exposed through byte-swapping accessors.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::*;
use crate::error::{Error, Result};

// =============================================================================
// Header Structures
// =============================================================================

/// 32-bit Mach-O header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader32 {
    /// Magic number (MH_MAGIC)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
}

impl MachHeader32 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 28;
}

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;
}

/// A primary header, decoded once from its magic field.
///
/// The 32- and 64-bit header layouts differ only in the trailing reserved
/// word; this variant type selects one shape up front and exposes the fields
/// the rest of the pipeline needs through common accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachHeader {
    /// 32-bit header (MH_MAGIC)
    Mach32(MachHeader32),
    /// 64-bit header (MH_MAGIC_64)
    Mach64(MachHeader64),
}

impl MachHeader {
    /// Decodes a primary header from the start of `data`.
    ///
    /// Fails with [`Error::InvalidMachoMagic`] for anything other than a
    /// native-order thin magic.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooSmall {
                needed: 4,
                available: data.len(),
            });
        }
        let magic = crate::util::read_u32_le(data);
        match magic {
            MH_MAGIC_64 => {
                let header = MachHeader64::read_from_prefix(data)
                    .map_err(|_| Error::BufferTooSmall {
                        needed: MachHeader64::SIZE,
                        available: data.len(),
                    })?
                    .0;
                Ok(MachHeader::Mach64(header))
            }
            MH_MAGIC => {
                let header = MachHeader32::read_from_prefix(data)
                    .map_err(|_| Error::BufferTooSmall {
                        needed: MachHeader32::SIZE,
                        available: data.len(),
                    })?
                    .0;
                Ok(MachHeader::Mach32(header))
            }
            other => Err(Error::InvalidMachoMagic(other)),
        }
    }

    /// Size of this header variant in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            MachHeader::Mach32(_) => MachHeader32::SIZE,
            MachHeader::Mach64(_) => MachHeader64::SIZE,
        }
    }

    /// Number of load commands.
    #[inline]
    pub fn ncmds(&self) -> u32 {
        match self {
            MachHeader::Mach32(h) => h.ncmds,
            MachHeader::Mach64(h) => h.ncmds,
        }
    }

    /// Total size of the load-command table in bytes.
    #[inline]
    pub fn sizeofcmds(&self) -> u32 {
        match self {
            MachHeader::Mach32(h) => h.sizeofcmds,
            MachHeader::Mach64(h) => h.sizeofcmds,
        }
    }

    /// CPU type.
    #[inline]
    pub fn cputype(&self) -> u32 {
        match self {
            MachHeader::Mach32(h) => h.cputype,
            MachHeader::Mach64(h) => h.cputype,
        }
    }

    /// CPU subtype.
    #[inline]
    pub fn cpusubtype(&self) -> u32 {
        match self {
            MachHeader::Mach32(h) => h.cpusubtype,
            MachHeader::Mach64(h) => h.cpusubtype,
        }
    }

    /// Returns the architecture as a string.
    pub fn arch_name(&self) -> &'static str {
        match self.cputype() {
            CPU_TYPE_ARM64 => {
                if (self.cpusubtype() & 0xFF) == CPU_SUBTYPE_ARM64E {
                    "arm64e"
                } else {
                    "arm64"
                }
            }
            CPU_TYPE_X86_64 => "x86_64",
            CPU_TYPE_ARM => "arm",
            CPU_TYPE_X86 => "i386",
            _ => "unknown",
        }
    }
}

impl fmt::Display for MachHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachO {{ arch: {}, cmds: {}, cmdsize: {:#x} }}",
            self.arch_name(),
            self.ncmds(),
            self.sizeofcmds()
        )
    }
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

// =============================================================================
// Encryption Info Command
// =============================================================================

/// Encryption info command.
///
/// The 64-bit layout (LC_ENCRYPTION_INFO_64) is identical except for four
/// trailing pad bytes, so this shape decodes the meaningful fields of both.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EncryptionInfoCommand {
    /// LC_ENCRYPTION_INFO or LC_ENCRYPTION_INFO_64
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// File offset of the encrypted range, relative to the header start
    pub cryptoff: u32,
    /// Size of the encrypted range
    pub cryptsize: u32,
    /// Encryption system ID (0 = not encrypted)
    pub cryptid: u32,
}

impl EncryptionInfoCommand {
    /// Size of the shared field layout.
    pub const SIZE: usize = 20;

    /// Byte offset of the `cryptid` field within the command.
    pub const CRYPTID_FIELD_OFFSET: u64 = 16;
}

/// 64-bit encryption info command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EncryptionInfoCommand64 {
    /// LC_ENCRYPTION_INFO_64
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// File offset of the encrypted range, relative to the header start
    pub cryptoff: u32,
    /// Size of the encrypted range
    pub cryptsize: u32,
    /// Encryption system ID (0 = not encrypted)
    pub cryptid: u32,
    /// Padding
    pub pad: u32,
}

impl EncryptionInfoCommand64 {
    /// Size of this command.
    pub const SIZE: usize = 24;
}

// =============================================================================
// Fat Container Structures
// =============================================================================

/// Fat container header. All fields big-endian on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    magic: u32,
    nfat_arch: u32,
}

impl FatHeader {
    /// Size of the fat header.
    pub const SIZE: usize = 8;

    /// Magic number, byte-swapped to host order.
    #[inline]
    pub fn magic(&self) -> u32 {
        u32::from_be(self.magic)
    }

    /// Number of slice descriptors that follow.
    #[inline]
    pub fn arch_count(&self) -> u32 {
        u32::from_be(self.nfat_arch)
    }
}

/// Fat slice descriptor (32-bit container). All fields big-endian on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch {
    cputype: u32,
    cpusubtype: u32,
    offset: u32,
    size: u32,
    align: u32,
}

impl FatArch {
    /// Size of a slice descriptor.
    pub const SIZE: usize = 20;

    /// CPU type of this slice.
    #[inline]
    pub fn cputype(&self) -> u32 {
        u32::from_be(self.cputype)
    }

    /// File offset where this slice's primary header begins.
    #[inline]
    pub fn offset(&self) -> u64 {
        u32::from_be(self.offset) as u64
    }

    /// Size of this slice in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        u32::from_be(self.size) as u64
    }
}

/// Fat slice descriptor (64-bit container). All fields big-endian on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch64 {
    cputype: u32,
    cpusubtype: u32,
    offset: u64,
    size: u64,
    align: u32,
    reserved: u32,
}

impl FatArch64 {
    /// Size of a slice descriptor.
    pub const SIZE: usize = 32;

    /// CPU type of this slice.
    #[inline]
    pub fn cputype(&self) -> u32 {
        u32::from_be(self.cputype)
    }

    /// File offset where this slice's primary header begins.
    #[inline]
    pub fn offset(&self) -> u64 {
        u64::from_be(self.offset)
    }

    /// Size of this slice in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        u64::from_be(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_64() {
        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: CPU_TYPE_ARM64,
            cpusubtype: CPU_SUBTYPE_ARM64_ALL,
            filetype: MH_EXECUTE,
            ncmds: 3,
            sizeofcmds: 96,
            flags: 0,
            reserved: 0,
        };
        let parsed = MachHeader::parse(header.as_bytes()).unwrap();
        assert_eq!(parsed.size(), MachHeader64::SIZE);
        assert_eq!(parsed.ncmds(), 3);
        assert_eq!(parsed.sizeofcmds(), 96);
        assert_eq!(parsed.arch_name(), "arm64");
    }

    #[test]
    fn test_parse_header_32() {
        let header = MachHeader32 {
            magic: MH_MAGIC,
            cputype: CPU_TYPE_ARM,
            cpusubtype: 0,
            filetype: MH_EXECUTE,
            ncmds: 1,
            sizeofcmds: 20,
            flags: 0,
        };
        let parsed = MachHeader::parse(header.as_bytes()).unwrap();
        assert_eq!(parsed.size(), MachHeader32::SIZE);
        assert_eq!(parsed.arch_name(), "arm");
    }

    #[test]
    fn test_parse_header_bad_magic() {
        let data = [0xDEu8, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0];
        assert!(matches!(
            MachHeader::parse(&data),
            Err(Error::InvalidMachoMagic(_))
        ));
    }

    #[test]
    fn test_fat_header_byte_order() {
        // 0xCAFEBABE with 2 slices, as the bytes appear on disk
        let data: [u8; 8] = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x02];
        let fh = FatHeader::read_from_bytes(&data).unwrap();
        assert_eq!(fh.magic(), FAT_MAGIC);
        assert_eq!(fh.arch_count(), 2);
    }

    #[test]
    fn test_fat_arch_offset() {
        let fa = FatArch {
            cputype: CPU_TYPE_ARM64.to_be(),
            cpusubtype: 0,
            offset: 0x4000u32.to_be(),
            size: 0x8000u32.to_be(),
            align: 14u32.to_be(),
        };
        assert_eq!(fa.cputype(), CPU_TYPE_ARM64);
        assert_eq!(fa.offset(), 0x4000);
        assert_eq!(fa.size(), 0x8000);
    }
}
