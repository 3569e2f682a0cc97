//! Static analysis interface.
//!
//! Instruction boundaries, basic blocks, encoding modes, and the
//! address-to-offset mapping all come from an external analyzer; the
//! engine never disassembles the binary on its own.

use anyhow::Result;

use crate::toolchain::Mode;

/// A basic block as reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: u64,
    /// First address past the block's last instruction.
    pub end: u64,
}

/// Instruction- and layout-level facts about the unpatched binary.
pub trait BinaryAnalyzer {
    /// Encoding mode in effect at `addr`.
    fn mode_at(&self, addr: u64) -> Result<Mode>;

    /// The bytes of `count` whole instructions starting at `addr`.
    fn instruction_bytes_at(&self, addr: u64, count: usize) -> Result<Vec<u8>>;

    /// The basic block containing `addr`.
    fn basic_block_at(&self, addr: u64) -> Result<BasicBlock>;

    /// Maps a memory address to its file offset.
    fn mem_addr_to_file_offset(&self, addr: u64) -> Result<u64>;
}
