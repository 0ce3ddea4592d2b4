//! Mach-O file format handling.
//!
//! Types and constants for the container, header, and load-command layouts
//! this crate decodes.

mod constants;
mod structs;

pub use constants::*;
pub use structs::*;
