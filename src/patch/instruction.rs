//! Instruction-level patches.
//!
//! Overwrites keep the surrounding instruction stream consistent: on a
//! variable-length ISA the covered region grows one whole original
//! instruction at a time and the slack is nop-padded, or the patch refuses
//! to apply. Insertion splices code through a detour block, or just places
//! and publishes it when given a name instead of an address.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::alloc::{Block, Perm};
use crate::arch::ArchInfo;
use crate::engine::PatchEngine;
use crate::error::{PatchError, Result};
use crate::patch::{shim, AddrRef};
use crate::splice::{self, DetourBody, DetourRequest};
use crate::symbol::{interpolate, Unresolved};
use crate::toolchain::{CompileOpts, Mode};

/// Overwrites instructions starting at an address.
#[derive(Debug, Clone)]
pub struct ModifyInstruction {
    addr: u64,
    asm: String,
    symbols: HashMap<String, u64>,
}

impl ModifyInstruction {
    pub fn new(addr: u64, asm: impl Into<String>) -> Self {
        Self {
            addr,
            asm: asm.into(),
            symbols: HashMap::new(),
        }
    }

    /// Extra symbols visible to this patch only.
    pub fn with_symbols(mut self, symbols: HashMap<String, u64>) -> Self {
        self.symbols = symbols;
        self
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        let merged = p.merged_symbols(&self.symbols);
        let text = interpolate(&self.asm, &merged, Unresolved::Reject)?;
        let mode = p.mode_at(self.addr)?;
        let mut bytes = p.assemble(&text, Some(self.addr), mode)?;

        if p.arch.variable_length_isa {
            let asm_size = bytes.len() as u64;
            let mut covered = 0u64;
            let mut count = 1usize;
            while covered < asm_size {
                covered = p.instruction_bytes_at(self.addr, count)?.len() as u64;
                count += 1;
            }
            let remainder = covered - asm_size;
            let nop = p.arch.nop_size();
            if remainder % nop != 0 {
                return Err(PatchError::Consistency(format!(
                    "{remainder} leftover bytes after the new instructions at {:#x} are not a \
                     multiple of the {nop}-byte nop; the overwrite would straddle an instruction \
                     boundary",
                    self.addr
                )));
            }
            bytes.extend_from_slice(&p.arch.nop_fill(remainder / nop));
        }

        let offset = p.file_offset_of(self.addr)?;
        p.write(offset, &bytes)
    }
}

/// How much an instruction removal covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// A byte count; must be a multiple of the nop size.
    Bytes(u64),
    /// A whole-instruction count. Accepted structurally, but apply always
    /// fails: there is no sizing policy for it.
    Instructions(usize),
}

/// Replaces instructions with nops.
#[derive(Debug, Clone)]
pub struct RemoveInstruction {
    addr: u64,
    removal: Removal,
}

impl RemoveInstruction {
    pub fn new(addr: u64, removal: Removal) -> Self {
        Self { addr, removal }
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        match self.removal {
            Removal::Instructions(count) => Err(PatchError::Configuration(format!(
                "removing {count} instructions at {:#x} by count is unsupported; give a byte \
                 count instead",
                self.addr
            ))),
            Removal::Bytes(len) => {
                let nop = p.arch.nop_size();
                if len % nop != 0 {
                    return Err(PatchError::Consistency(format!(
                        "cannot remove {len} bytes at {:#x}: not a multiple of the {nop}-byte nop",
                        self.addr
                    )));
                }
                let fill = p.arch.nop_fill(len / nop);
                let offset = p.file_offset_of(self.addr)?;
                p.write(offset, &fill)
            }
        }
    }
}

/// Configuration for C-language insertions.
#[derive(Debug, Clone, Default)]
pub struct CConfig {
    /// C declarations placed ahead of the generated shim: types, headers,
    /// forward declarations the body needs.
    pub forward_header: String,
    /// Registers the compiler may clobber. Still readable in the body,
    /// but their values are not carried out of the micropatch.
    pub scratch_regs: BTreeSet<String>,
    /// Subregisters to expose instead of their full parents. Requesting
    /// one hides the parent register from the body.
    pub sub_regs: BTreeSet<String>,
    /// Float register name to C type; `float` unless remapped (e.g. to
    /// `double`).
    pub float_types: BTreeMap<String, String>,
    /// Assembly run before the compiled body. Mainly useful to reach the
    /// stack pointer, which the shim never exposes.
    pub asm_header: String,
    /// Assembly run after the compiled body.
    pub asm_footer: String,
}

/// The inserted code, by language.
#[derive(Debug, Clone)]
pub enum InsertBody {
    /// Assembly text. May use SAVE_CONTEXT / RESTORE_CONTEXT tokens and
    /// `{name}` references.
    Asm(String),
    /// A restricted-C body keyed to named registers, spliced through the
    /// generated calling-convention shim.
    C { body: String, config: CConfig },
}

/// Splices new code into the binary.
///
/// With a fixed address the code lands in a free executable block reached
/// by an overwritten branch at the site. With a name the code is only
/// placed and published; nothing branches to it until a later patch
/// references the name.
#[derive(Debug, Clone)]
pub struct InsertInstruction {
    at: AddrRef,
    body: InsertBody,
    force: bool,
    detour_pos: Option<u64>,
    symbols: HashMap<String, u64>,
    thumb: bool,
    save_context: bool,
    compile_opts: CompileOpts,
}

impl InsertInstruction {
    pub fn asm(at: impl Into<AddrRef>, body: impl Into<String>) -> Self {
        Self::with_body(at.into(), InsertBody::Asm(body.into()))
    }

    pub fn c(at: impl Into<AddrRef>, body: impl Into<String>, config: CConfig) -> Self {
        Self::with_body(
            at.into(),
            InsertBody::C {
                body: body.into(),
                config,
            },
        )
    }

    fn with_body(at: AddrRef, body: InsertBody) -> Self {
        Self {
            at,
            body,
            force: false,
            detour_pos: None,
            symbols: HashMap::new(),
            thumb: false,
            save_context: false,
            compile_opts: CompileOpts::new(),
        }
    }

    /// Relocate past the basic-block boundary instead of failing.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Place the new code at this file position instead of allocating.
    pub fn at_detour(mut self, pos: u64) -> Self {
        self.detour_pos = Some(pos);
        self
    }

    /// Extra symbols visible to this patch only.
    pub fn with_symbols(mut self, symbols: HashMap<String, u64>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Assemble a named body as Thumb.
    pub fn thumb(mut self) -> Self {
        self.thumb = true;
        self
    }

    /// Wrap the whole body in a context save/restore pair.
    pub fn save_context(mut self) -> Self {
        self.save_context = true;
        self
    }

    /// Compiler flag overrides for C bodies.
    pub fn compile_opts(mut self, opts: CompileOpts) -> Self {
        self.compile_opts = opts;
        self
    }

    pub(crate) fn apply(&self, p: &mut PatchEngine) -> Result<()> {
        match &self.body {
            InsertBody::Asm(text) => self.apply_asm(p, text),
            InsertBody::C { body, config } => self.apply_c(p, body, config),
        }
    }

    fn apply_asm(&self, p: &mut PatchEngine, text: &str) -> Result<()> {
        let text = expand_context(text, &p.arch, self.save_context);
        match &self.at {
            AddrRef::Addr(addr) => splice::insert_detour(
                p,
                DetourRequest {
                    addr: *addr,
                    body: DetourBody::Asm(text),
                    force: self.force,
                    detour_pos: self.detour_pos,
                    symbols: &self.symbols,
                },
            ),
            AddrRef::Name(name) => self.apply_named(p, name, &text),
        }
    }

    /// Named insertion: size, place, publish, then assemble for real.
    /// Publishing before the final assembly is what lets the body
    /// reference its own name and lets later patches reference it.
    fn apply_named(&self, p: &mut PatchEngine, name: &str, text: &str) -> Result<()> {
        let mode = if self.thumb { Mode::Thumb } else { Mode::Standard };

        let merged = p.merged_symbols(&self.symbols);
        let sized = interpolate(text, &merged, Unresolved::Zero)?;
        let size = p.assemble(&sized, None, mode)?.len() as u64;

        let block = match self.detour_pos {
            Some(pos) => Block {
                mem_addr: pos,
                file_offset: pos,
                size,
            },
            None => p.allocate(size, p.arch.alignment, Perm::ReadExecute)?,
        };
        p.symbols.define(name, block.mem_addr);
        tracing::debug!(name, mem_addr = block.mem_addr, size, "placed named code");

        let merged = p.merged_symbols(&self.symbols);
        let text = interpolate(text, &merged, Unresolved::Reject)?;
        let bytes = p.assemble(&text, Some(block.mem_addr), mode)?;
        if self.detour_pos.is_none() && bytes.len() as u64 > block.size {
            return Err(PatchError::Consistency(format!(
                "named insertion `{name}` grew from {} to {} bytes between sizing and final \
                 assembly",
                block.size,
                bytes.len()
            )));
        }
        p.write(block.file_offset, &bytes)
    }

    fn apply_c(&self, p: &mut PatchEngine, body: &str, config: &CConfig) -> Result<()> {
        let addr = match &self.at {
            AddrRef::Addr(addr) => *addr,
            AddrRef::Name(name) => {
                return Err(PatchError::Configuration(format!(
                    "C insertion `{name}` needs a fixed address; named C blocks are not supported"
                )))
            }
        };

        let preserve_none = p.toolchain.compiler.preserve_none();
        let source = shim::generate(&p.arch, preserve_none, body, config)?;
        tracing::info!("generated micropatch shim for {addr:#x}:\n{source}");

        splice::insert_detour(
            p,
            DetourRequest {
                addr,
                body: DetourBody::C {
                    source,
                    asm_header: config.asm_header.clone(),
                    asm_footer: config.asm_footer.clone(),
                    opts: self.compile_opts.clone(),
                },
                force: self.force,
                detour_pos: self.detour_pos,
                symbols: &self.symbols,
            },
        )
    }
}

/// Expands SAVE_CONTEXT / RESTORE_CONTEXT tokens and, when requested,
/// wraps the whole body in a save/restore pair. Runs exactly once per
/// apply; the expanded text is never scanned for tokens again.
fn expand_context(text: &str, arch: &ArchInfo, save_context: bool) -> String {
    let mut out = text.replace("SAVE_CONTEXT", &format!("\n{}\n", arch.save_context_asm));
    out = out.replace(
        "RESTORE_CONTEXT",
        &format!("\n{}\n", arch.restore_context_asm),
    );
    if save_context {
        out = format!(
            "{}\n{}\n{}",
            arch.save_context_asm, out, arch.restore_context_asm
        );
    }
    out
}
