//! Patch application engine.
//!
//! `PatchEngine` is the shared mutable context every patch applies
//! against: the architecture descriptor, the external toolchain and
//! analysis collaborators, the binary image, the allocator, and the run's
//! symbol table. Application is strictly sequential, so patch N+1 observes
//! every effect of patch N, and the first failure aborts the rest of the
//! run with no rollback.

use std::collections::HashMap;

use crate::alloc::{Allocator, Block, Perm};
use crate::analysis::{BasicBlock, BinaryAnalyzer};
use crate::arch::ArchInfo;
use crate::error::{PatchError, Result};
use crate::image::BinaryImage;
use crate::patch::Patch;
use crate::symbol::SymbolTable;
use crate::toolchain::{Assembler, Compiler, CompileOpts, Disassembler, Mode};

/// Engine-wide policies.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Permission class for named data insertions. Defaults to
    /// read+write+execute; runs whose inserted data never needs execution
    /// can dial this down to read+write.
    pub data_perm: Perm,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            data_perm: Perm::ReadWriteExecute,
        }
    }
}

/// The external toolchain bundle.
pub struct Toolchain {
    pub assembler: Box<dyn Assembler>,
    pub disassembler: Box<dyn Disassembler>,
    pub compiler: Box<dyn Compiler>,
}

/// Shared mutable context for one patching run.
pub struct PatchEngine {
    pub arch: ArchInfo,
    pub toolchain: Toolchain,
    pub analyzer: Box<dyn BinaryAnalyzer>,
    pub image: Box<dyn BinaryImage>,
    pub allocator: Box<dyn Allocator>,
    pub options: EngineOptions,
    pub symbols: SymbolTable,
}

impl PatchEngine {
    pub fn new(
        arch: ArchInfo,
        toolchain: Toolchain,
        analyzer: Box<dyn BinaryAnalyzer>,
        image: Box<dyn BinaryImage>,
        allocator: Box<dyn Allocator>,
    ) -> Self {
        Self {
            arch,
            toolchain,
            analyzer,
            image,
            allocator,
            options: EngineOptions::default(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Applies one patch.
    pub fn apply(&mut self, patch: &Patch) -> Result<()> {
        tracing::debug!(kind = patch.kind(), "applying patch");
        patch.apply(self)
    }

    /// Applies patches in order, stopping at the first failure. Patches
    /// already applied stay applied; rollback is the caller's business.
    pub fn apply_all(&mut self, patches: &[Patch]) -> Result<()> {
        for (index, patch) in patches.iter().enumerate() {
            if let Err(err) = self.apply(patch) {
                tracing::debug!(index, kind = patch.kind(), "aborting run: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Symbols published so far in this run.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Run symbols with per-patch `overrides` layered on top.
    pub(crate) fn merged_symbols(&self, overrides: &HashMap<String, u64>) -> SymbolTable {
        self.symbols.merged(overrides)
    }

    // Collaborator calls below wrap external failures into the typed
    // taxonomy, attaching the offending address or size.

    pub(crate) fn mode_at(&self, addr: u64) -> Result<Mode> {
        self.analyzer.mode_at(addr).map_err(|e| {
            PatchError::Configuration(format!("no encoding mode known for {addr:#x}: {e:#}"))
        })
    }

    pub(crate) fn instruction_bytes_at(&self, addr: u64, count: usize) -> Result<Vec<u8>> {
        self.analyzer.instruction_bytes_at(addr, count).map_err(|e| {
            PatchError::Configuration(format!(
                "cannot read {count} whole instructions at {addr:#x}: {e:#}"
            ))
        })
    }

    pub(crate) fn basic_block_at(&self, addr: u64) -> Result<BasicBlock> {
        self.analyzer.basic_block_at(addr).map_err(|e| {
            PatchError::Configuration(format!("no basic block known at {addr:#x}: {e:#}"))
        })
    }

    pub(crate) fn file_offset_of(&self, addr: u64) -> Result<u64> {
        self.analyzer.mem_addr_to_file_offset(addr).map_err(|e| {
            PatchError::Configuration(format!(
                "memory address {addr:#x} does not map to a file offset: {e:#}"
            ))
        })
    }

    pub(crate) fn assemble(&self, text: &str, position: Option<u64>, mode: Mode) -> Result<Vec<u8>> {
        self.toolchain
            .assembler
            .assemble(text, position, mode)
            .map_err(|source| PatchError::Assembly {
                context: match position {
                    Some(addr) => format!("{addr:#x}"),
                    None => "unpositioned text".to_string(),
                },
                source,
            })
    }

    pub(crate) fn disassemble(&self, bytes: &[u8], addr: u64, mode: Mode) -> Result<String> {
        self.toolchain
            .disassembler
            .disassemble(bytes, addr, mode)
            .map_err(|source| PatchError::Assembly {
                context: format!("disassembly of {} bytes at {addr:#x}", bytes.len()),
                source,
            })
    }

    pub(crate) fn compile(
        &self,
        source: &str,
        position: u64,
        callback: Option<u64>,
        opts: &CompileOpts,
    ) -> Result<Vec<u8>> {
        self.toolchain
            .compiler
            .compile(source, position, callback, opts)
            .map_err(|source| PatchError::Assembly {
                context: format!("compilation for {position:#x}"),
                source,
            })
    }

    pub(crate) fn allocate(&mut self, size: u64, align: u64, perm: Perm) -> Result<Block> {
        self.allocator
            .allocate(size, align, perm)
            .map_err(|source| PatchError::Allocation { size, perm, source })
    }

    pub(crate) fn write(&mut self, file_offset: u64, bytes: &[u8]) -> Result<()> {
        self.image.update_content(file_offset, bytes).map_err(|e| {
            PatchError::Consistency(format!(
                "image rejected {} bytes at offset {file_offset:#x}: {e:#}",
                bytes.len()
            ))
        })
    }
}
