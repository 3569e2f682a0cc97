//! Architecture descriptor tables.
//!
//! Everything the engine knows about an instruction set lives in an
//! `ArchInfo` value: encodings, alignment, register sets, ABI argument
//! orders, subregister aliasing, and the context save/restore assembly.
//! The shipped descriptors are plain data; supporting another ISA means
//! writing another table, not more code.

pub mod aarch64;
pub mod arm;
pub mod x86_64;

/// One parent register's subregister families: the parent name, then for
/// each bit width the children of that width. Only the first-listed child
/// of a width is individually usable; later siblings alias the same bits.
/// The parent itself appears as the sole child at its full width.
pub type SubRegisterFamily = (
    &'static str,
    &'static [(u32, &'static [&'static str])],
);

/// Ordered register lists for one calling convention.
#[derive(Debug, Clone)]
pub struct Abi {
    /// Integer argument registers, in ABI order.
    pub int_args: &'static [&'static str],
    /// Float argument registers, in ABI order.
    pub float_args: &'static [&'static str],
    /// Callee-saved integer registers. Never exposed to shims; the
    /// compiler already saves and restores them.
    pub callee_saved: &'static [&'static str],
    /// Callee-saved float registers.
    pub callee_saved_float: &'static [&'static str],
}

/// Static description of a target instruction set.
#[derive(Debug, Clone)]
pub struct ArchInfo {
    pub name: &'static str,
    /// Pointer width in bits.
    pub bits: u32,
    /// Alignment for allocated code blocks.
    pub alignment: u64,
    /// Canonical nop encoding.
    pub nop_bytes: &'static [u8],
    /// Whether instruction lengths vary. Drives nop padding when
    /// overwriting instructions.
    pub variable_length_isa: bool,
    /// Unconditional branch template; `{dst}` is the absolute target.
    pub branch_asm: &'static str,
    /// Encoded size of `branch_asm`.
    pub branch_size: u64,
    /// General-purpose registers a shim may see (stack pointer excluded).
    pub regs: &'static [&'static str],
    /// Float registers a shim may see.
    pub regs_float: &'static [&'static str],
    /// Subregister aliasing tables for the general-purpose registers.
    pub subregisters: &'static [SubRegisterFamily],
    /// Assembly that saves the full register context to the stack.
    pub save_context_asm: &'static str,
    /// Assembly that undoes `save_context_asm`.
    pub restore_context_asm: &'static str,
    /// The default calling convention.
    pub abi: Abi,
    /// The reduced preserve-none convention, when the target has one.
    pub abi_preserve_none: Option<Abi>,
}

impl ArchInfo {
    /// Size of one nop instruction.
    pub fn nop_size(&self) -> u64 {
        self.nop_bytes.len() as u64
    }

    /// `count` nops, encoded.
    pub fn nop_fill(&self, count: u64) -> Vec<u8> {
        self.nop_bytes.repeat(count as usize)
    }

    /// The ABI in effect. Preserve-none is honored only when the target
    /// actually has a reduced convention.
    pub fn select_abi(&self, preserve_none: bool) -> &Abi {
        if preserve_none {
            self.abi_preserve_none.as_ref().unwrap_or(&self.abi)
        } else {
            &self.abi
        }
    }

    /// Branch text to an absolute destination.
    pub fn branch_to(&self, dst: u64) -> String {
        self.branch_asm.replace("{dst}", &format!("{dst:#x}"))
    }
}
