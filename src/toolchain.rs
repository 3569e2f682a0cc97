//! Toolchain interfaces.
//!
//! The assembler, disassembler, and restricted-C compiler are external
//! programs as far as this crate is concerned; these traits are the seams
//! they plug into. Implementations report failures through `anyhow` with
//! whatever context they have; the engine wraps them into the patch error
//! taxonomy.

use std::collections::BTreeMap;

use anyhow::Result;

/// Instruction-encoding mode in effect at a program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The architecture's primary encoding.
    #[default]
    Standard,
    /// Thumb encoding on interworking ARM targets.
    Thumb,
}

/// Text to machine code.
pub trait Assembler {
    /// Assembles `text` as if placed at `position` (when known), in `mode`.
    ///
    /// Placeholder interpolation has already happened by the time text gets
    /// here; an unresolved reference is an ordinary syntax error.
    fn assemble(&self, text: &str, position: Option<u64>, mode: Mode) -> Result<Vec<u8>>;
}

/// Machine code to relocatable text.
pub trait Disassembler {
    /// Disassembles `bytes` as found at `addr`, producing text the
    /// assembler accepts at a different position (PC-relative operands
    /// rendered absolute).
    fn disassemble(&self, bytes: &[u8], addr: u64, mode: Mode) -> Result<String>;
}

/// Compiler flag overrides, flag name to value.
pub type CompileOpts = BTreeMap<String, String>;

/// Restricted C to machine code.
pub trait Compiler {
    /// Compiles `source` for execution at `position`. When `callback` is
    /// given, the `_CALLBACK` symbol resolves to that address.
    fn compile(
        &self,
        source: &str,
        position: u64,
        callback: Option<u64>,
        opts: &CompileOpts,
    ) -> Result<Vec<u8>>;

    /// Whether the compiler accepts the reduced preserve-none convention.
    fn preserve_none(&self) -> bool {
        false
    }
}
