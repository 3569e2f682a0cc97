//! Binary image mutation interface.
//!
//! The engine never touches the file format; by the time a write reaches
//! the image it is a plain file offset (address mapping lives on the
//! analyzer). The `elf` submodule holds a minimal ELF-backed
//! implementation.

pub mod elf;

use anyhow::Result;

/// In-place mutation of the binary's content bytes.
pub trait BinaryImage {
    /// Overwrites `bytes.len()` bytes at `file_offset`. Writes landing
    /// past the current end of the image extend it.
    fn update_content(&mut self, file_offset: u64, bytes: &[u8]) -> Result<()>;
}
