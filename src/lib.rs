//! machdump - recover decrypted Mach-O executables from process memory.
//!
//! A binary whose on-disk form is encrypted is decrypted by the loader before
//! it runs, so the plaintext exists in the process's memory. This library
//! takes a read-only view of that memory together with the on-disk file and
//! produces a standalone copy that is byte-identical to the original except
//! that each encrypted range holds the plaintext observed in memory and each
//! encryption flag is cleared.
//!
//! # Pipeline
//!
//! 1. **Container resolution** - locate the slice of a (possibly fat) file
//!    that matches the loaded image, by byte-comparing primary headers
//! 2. **Load-command scan** - walk the image's command table for encryption
//!    descriptors
//! 3. **Patching** - copy the file verbatim, then overwrite each encrypted
//!    range with plaintext and zero its flag
//!
//! # Example
//!
//! ```no_run
//! use machdump::{dump_image, LoadedImage, MemoryImage};
//!
//! fn main() -> machdump::Result<()> {
//!     // The host supplies the image's bytes as mapped in memory.
//!     let memory: &[u8] = unimplemented!();
//!
//!     let image = LoadedImage {
//!         path: Some("/var/containers/Bundle/App.app/App".into()),
//!         memory: MemoryImage::new(0x1_0000_0000, memory)?,
//!     };
//!     let stats = dump_image(&image, "App.decrypted".as_ref())?;
//!     println!("{}", stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod driver;
pub mod error;
pub mod image;
pub mod macho;
pub mod patch;
pub mod scanner;

mod util;

pub use container::{resolve_slice, ContainerKind, ResolvedSlice};
pub use driver::{dump_all, dump_image, process, DumpStats, LoadedImage, OutputTarget};
pub use error::{Error, Result};
pub use image::MemoryImage;
pub use patch::{PatchRegion, PatchStatus};
pub use scanner::{encryption_commands, load_commands, EncryptionInfo};
