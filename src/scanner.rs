//! Load-command table scanner.
//!
//! Walks the command table of an in-memory image, starting immediately after
//! the fixed-size primary header. The walk is bounded by both the declared
//! command count and the declared table length, and by the view's extent;
//! unrecognized command types are skipped by advancing the declared size.

use zerocopy::FromBytes;

use crate::image::MemoryImage;
use crate::macho::{
    EncryptionInfoCommand, LoadCommand, LC_ENCRYPTION_INFO, LC_ENCRYPTION_INFO_64,
};
use crate::util::read_u32_le_at;

/// One record in the command table.
#[derive(Debug, Clone, Copy)]
pub struct RawCommand<'a> {
    /// Command type tag
    pub cmd: u32,
    /// Declared total size of the record
    pub cmdsize: u32,
    /// Offset of the record, relative to the header start
    pub offset: u64,
    /// The record's bytes, clipped to the declared table length
    pub data: &'a [u8],
}

/// An encryption descriptor surfaced from the command table.
///
/// `cryptoff` and `cryptsize` are relative to the binary's own header start,
/// never to a containing fat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// Offset of the encrypted range
    pub cryptoff: u32,
    /// Size of the encrypted range
    pub cryptsize: u32,
    /// Encryption system ID (0 = not encrypted)
    pub cryptid: u32,
    /// Offset of the descriptor record itself, relative to the header start
    pub command_offset: u64,
}

/// Lazy iterator over the command table of a memory image.
#[derive(Debug, Clone)]
pub struct LoadCommands<'a> {
    data: &'a [u8],
    offset: usize,
    end: usize,
    remaining: u32,
}

impl<'a> LoadCommands<'a> {
    fn new(image: &MemoryImage<'a>) -> Self {
        let header = image.header();
        let start = header.size();
        let declared_end = start.saturating_add(header.sizeofcmds() as usize);
        let data = image.as_bytes();
        Self {
            data,
            offset: start,
            end: declared_end.min(data.len()),
            remaining: header.ncmds(),
        }
    }
}

impl<'a> Iterator for LoadCommands<'a> {
    type Item = RawCommand<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.offset + LoadCommand::SIZE > self.end {
            return None;
        }

        let cmd = read_u32_le_at(self.data, self.offset);
        let cmdsize = read_u32_le_at(self.data, self.offset + 4);

        // A record smaller than its own header cannot advance the cursor.
        if (cmdsize as usize) < LoadCommand::SIZE {
            self.remaining = 0;
            return None;
        }

        let record_end = (self.offset + cmdsize as usize).min(self.end);
        let record = RawCommand {
            cmd,
            cmdsize,
            offset: self.offset as u64,
            data: &self.data[self.offset..record_end],
        };

        self.offset += cmdsize as usize;
        self.remaining -= 1;
        Some(record)
    }
}

/// Returns a lazy iterator over all command records of `image`.
pub fn load_commands<'a>(image: &MemoryImage<'a>) -> LoadCommands<'a> {
    LoadCommands::new(image)
}

/// Returns a lazy iterator over the encryption descriptors of `image`.
///
/// The 32- and 64-bit descriptor layouts share the three fields of interest;
/// the 64-bit trailing pad is ignored.
pub fn encryption_commands<'a>(
    image: &MemoryImage<'a>,
) -> impl Iterator<Item = EncryptionInfo> + 'a {
    load_commands(image).filter_map(|record| {
        if record.cmd != LC_ENCRYPTION_INFO && record.cmd != LC_ENCRYPTION_INFO_64 {
            return None;
        }
        let command = EncryptionInfoCommand::read_from_prefix(record.data).ok()?.0;
        Some(EncryptionInfo {
            cryptoff: command.cryptoff,
            cryptsize: command.cryptsize,
            cryptid: command.cryptid,
            command_offset: record.offset,
        })
    })
}
