//! Data and raw-byte patches.
//!
//! These never touch instruction boundaries: they overwrite, zero, or
//! place bytes. Only named insertion allocates.

use crate::engine::PatchEngine;
use crate::error::Result;
use crate::patch::{AddrKind, AddrRef};

/// Overwrites bytes in place at a memory address or raw file offset.
#[derive(Debug, Clone)]
pub struct ModifyRawBytes {
    addr: u64,
    bytes: Vec<u8>,
    kind: AddrKind,
}

impl ModifyRawBytes {
    pub fn new(addr: u64, bytes: Vec<u8>, kind: AddrKind) -> Self {
        Self { addr, bytes, kind }
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        let offset = match self.kind {
            AddrKind::FileOffset => self.addr,
            AddrKind::Memory => p.file_offset_of(self.addr)?,
        };
        p.write(offset, &self.bytes)
    }
}

/// Overwrites data at a memory address.
#[derive(Debug, Clone)]
pub struct ModifyData {
    addr: u64,
    bytes: Vec<u8>,
}

impl ModifyData {
    pub fn new(addr: u64, bytes: Vec<u8>) -> Self {
        Self { addr, bytes }
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        ModifyRawBytes::new(self.addr, self.bytes.clone(), AddrKind::Memory).apply(p)
    }
}

/// Places new data in the binary.
///
/// With a fixed address the bytes are written directly at that file
/// position. With a name, a block is drawn from the free-space pool named
/// by the engine's data permission policy, the block's memory address is
/// published under the name, and the bytes land at the block's file
/// offset.
#[derive(Debug, Clone)]
pub struct InsertData {
    at: AddrRef,
    bytes: Vec<u8>,
}

impl InsertData {
    pub fn new(at: impl Into<AddrRef>, bytes: Vec<u8>) -> Self {
        Self {
            at: at.into(),
            bytes,
        }
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        match &self.at {
            AddrRef::Addr(addr) => p.write(*addr, &self.bytes),
            AddrRef::Name(name) => {
                let block = p.allocate(self.bytes.len() as u64, 1, p.options.data_perm)?;
                p.symbols.define(name.clone(), block.mem_addr);
                tracing::debug!(name = %name, mem_addr = block.mem_addr, "placed named data");
                p.write(block.file_offset, &self.bytes)
            }
        }
    }
}

/// Zeroes `size` bytes of data at a memory address.
#[derive(Debug, Clone)]
pub struct RemoveData {
    addr: u64,
    size: usize,
}

impl RemoveData {
    pub fn new(addr: u64, size: usize) -> Self {
        Self { addr, size }
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        ModifyRawBytes::new(self.addr, vec![0; self.size], AddrKind::Memory).apply(p)
    }
}
