//! ELF-backed binary image.
//!
//! Parses just enough of the input (the program headers) to map memory
//! addresses to file offsets, and keeps the whole file as a mutable byte
//! vector for in-place patching. Everything else about the format is
//! preserved verbatim on save.

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;
use object::read::{Object, ObjectSegment};

use super::BinaryImage;

/// One loadable segment mapping.
#[derive(Debug, Clone, Copy)]
struct LoadSegment {
    vaddr: u64,
    file_offset: u64,
    file_size: u64,
}

/// A loaded ELF whose content bytes can be rewritten and saved.
pub struct ElfImage {
    content: Vec<u8>,
    segments: Vec<LoadSegment>,
}

impl ElfImage {
    /// Memory-maps `path` and takes a private copy of its bytes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(mmap.to_vec())
    }

    /// Parses an in-memory ELF.
    pub fn from_bytes(content: Vec<u8>) -> Result<Self> {
        let parsed = object::File::parse(&*content).context("failed to parse ELF")?;
        let mut segments = Vec::new();
        for segment in parsed.segments() {
            let (file_offset, file_size) = segment.file_range();
            segments.push(LoadSegment {
                vaddr: segment.address(),
                file_offset,
                file_size,
            });
        }
        tracing::debug!(segments = segments.len(), "loaded ELF image");
        drop(parsed);
        Ok(Self { content, segments })
    }

    /// File offset backing a memory address, from the load segments.
    /// Addresses inside a segment's zero-fill tail have no file bytes and
    /// return `None`.
    pub fn mem_addr_to_file_offset(&self, addr: u64) -> Option<u64> {
        self.segments.iter().find_map(|seg| {
            if addr >= seg.vaddr && addr < seg.vaddr + seg.file_size {
                Some(seg.file_offset + (addr - seg.vaddr))
            } else {
                None
            }
        })
    }

    /// The current (possibly patched) bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Writes the patched bytes to `path` and marks them executable.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, &self.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
        Ok(())
    }
}

impl BinaryImage for ElfImage {
    fn update_content(&mut self, file_offset: u64, bytes: &[u8]) -> Result<()> {
        let start = file_offset as usize;
        let end = start + bytes.len();
        if end > self.content.len() {
            self.content.resize(end, 0);
        }
        self.content[start..end].copy_from_slice(bytes);
        Ok(())
    }
}
