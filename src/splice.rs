//! Detour splicing.
//!
//! Turns "run this code at this address" into the concrete trampoline:
//! enough whole instructions are relocated from the patch site into a
//! fresh executable block, the new code runs between them and a branch
//! back to the first untouched instruction, and the site itself is
//! overwritten with a branch to the block.

use std::collections::HashMap;

use crate::alloc::{Block, Perm};
use crate::engine::PatchEngine;
use crate::error::{PatchError, Result};
use crate::symbol::{interpolate, SymbolTable, Unresolved};
use crate::toolchain::{CompileOpts, Mode};

/// The code to place in the detour block, by language.
#[derive(Debug, Clone)]
pub enum DetourBody {
    /// Assembly text, already context-expanded.
    Asm(String),
    /// Generated C source with raw assembly to run around it.
    C {
        source: String,
        asm_header: String,
        asm_footer: String,
        opts: CompileOpts,
    },
}

/// One splice request.
pub struct DetourRequest<'a> {
    pub addr: u64,
    pub body: DetourBody,
    /// Relocate past the basic-block end instead of failing.
    pub force: bool,
    /// Place the block at this file position instead of allocating.
    pub detour_pos: Option<u64>,
    /// Symbols visible to this request only.
    pub symbols: &'a HashMap<String, u64>,
}

/// Body with its assembly parts symbol-resolved.
enum ResolvedBody {
    Asm(String),
    C {
        source: String,
        header: String,
        footer: String,
        opts: CompileOpts,
    },
}

/// Splices `req.body` in at `req.addr`.
pub fn insert_detour(p: &mut PatchEngine, req: DetourRequest<'_>) -> Result<()> {
    let addr = req.addr;
    let mode = p.mode_at(addr)?;
    let branch_size = p.arch.branch_size;

    let bb = p.basic_block_at(addr)?;
    let room = bb.end.saturating_sub(addr);
    if room < branch_size && !req.force {
        return Err(PatchError::Splice {
            addr,
            reason: format!(
                "a {branch_size}-byte branch does not fit in the {room} bytes left in the basic \
                 block ending at {:#x}; set force to relocate across the boundary",
                bb.end
            ),
        });
    }

    // Relocate whole instructions until the branch fits.
    let mut count = 1;
    let mut moved = p.instruction_bytes_at(addr, count)?;
    while (moved.len() as u64) < branch_size {
        count += 1;
        moved = p.instruction_bytes_at(addr, count)?;
    }
    let moved_len = moved.len() as u64;
    let return_addr = addr + moved_len;
    let moved_text = p.disassemble(&moved, addr, mode)?;
    tracing::debug!("building detour block for {addr:#x}: relocating {count} instructions ({moved_len} bytes)");

    let merged = p.merged_symbols(req.symbols);
    let body = resolve_body(&req.body, &merged)?;

    // Size the block first, then re-emit everything at its real address.
    let (block, bytes) = match req.detour_pos {
        Some(pos) => {
            let bytes = emit_block(p, pos, &moved_text, &body, return_addr, mode)?;
            let block = Block {
                mem_addr: pos,
                file_offset: pos,
                size: bytes.len() as u64,
            };
            (block, bytes)
        }
        None => {
            let size = emit_block(p, 0, &moved_text, &body, return_addr, mode)?.len() as u64;
            let block = p.allocate(size, p.arch.alignment, Perm::ReadExecute)?;
            let bytes = emit_block(p, block.mem_addr, &moved_text, &body, return_addr, mode)?;
            if bytes.len() as u64 > block.size {
                return Err(PatchError::Consistency(format!(
                    "detour block at {:#x} grew from {} to {} bytes between sizing and final \
                     emission",
                    block.mem_addr,
                    block.size,
                    bytes.len()
                )));
            }
            (block, bytes)
        }
    };
    p.write(block.file_offset, &bytes)?;

    // Overwrite the site with a branch to the block, nop-filling the rest
    // of the relocated region.
    let branch = p.arch.branch_to(block.mem_addr);
    let mut site = p.assemble(&branch, Some(addr), mode)?;
    if site.len() as u64 > moved_len {
        return Err(PatchError::Consistency(format!(
            "site branch at {addr:#x} is {} bytes but only {moved_len} were relocated",
            site.len()
        )));
    }
    let fill = moved_len - site.len() as u64;
    let nop = p.arch.nop_size();
    if fill % nop != 0 {
        return Err(PatchError::Consistency(format!(
            "{fill} bytes left after the site branch at {addr:#x} are not a multiple of the \
             {nop}-byte nop"
        )));
    }
    site.extend_from_slice(&p.arch.nop_fill(fill / nop));
    let offset = p.file_offset_of(addr)?;
    p.write(offset, &site)
}

/// Interpolates the assembly parts of the body. Relocated-original text
/// and generated C source are never scanned for placeholders.
fn resolve_body(body: &DetourBody, symbols: &SymbolTable) -> Result<ResolvedBody> {
    Ok(match body {
        DetourBody::Asm(text) => {
            ResolvedBody::Asm(interpolate(text, symbols, Unresolved::Reject)?)
        }
        DetourBody::C {
            source,
            asm_header,
            asm_footer,
            opts,
        } => ResolvedBody::C {
            source: source.clone(),
            header: interpolate(asm_header, symbols, Unresolved::Reject)?,
            footer: interpolate(asm_footer, symbols, Unresolved::Reject)?,
            opts: opts.clone(),
        },
    })
}

/// Emits the complete detour block as placed at `base`: relocated
/// originals, then the body, then the branch back.
fn emit_block(
    p: &PatchEngine,
    base: u64,
    moved_text: &str,
    body: &ResolvedBody,
    return_addr: u64,
    mode: Mode,
) -> Result<Vec<u8>> {
    match body {
        ResolvedBody::Asm(text) => {
            let block_text = format!(
                "{moved_text}\n{text}\n{}",
                p.arch.branch_to(return_addr)
            );
            p.assemble(&block_text, Some(base), mode)
        }
        ResolvedBody::C {
            source,
            header,
            footer,
            opts,
        } => {
            let mut out = p.assemble(moved_text, Some(base), mode)?;
            out.extend(assemble_opt(p, header, base + out.len() as u64, mode)?);

            // The callback lands immediately after the compiled code, so
            // its size has to be known before it can be bound. Compile
            // once to measure, then again with the callback resolved; the
            // code must not change size between the two.
            let c_pos = base + out.len() as u64;
            let probe = p.compile(source, c_pos, None, opts)?;
            let c_len = probe.len() as u64;
            let compiled = p.compile(source, c_pos, Some(c_pos + c_len), opts)?;
            if compiled.len() != probe.len() {
                return Err(PatchError::Consistency(format!(
                    "compiled micropatch at {c_pos:#x} changed from {} to {} bytes when the \
                     callback address was bound",
                    probe.len(),
                    compiled.len()
                )));
            }
            out.extend(compiled);

            out.extend(assemble_opt(p, footer, base + out.len() as u64, mode)?);
            let branch = p.arch.branch_to(return_addr);
            let tail = p.assemble(&branch, Some(base + out.len() as u64), mode)?;
            out.extend(tail);
            Ok(out)
        }
    }
}

/// Assembles possibly-empty snippet text.
fn assemble_opt(p: &PatchEngine, text: &str, position: u64, mode: Mode) -> Result<Vec<u8>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    p.assemble(text, Some(position), mode)
}
