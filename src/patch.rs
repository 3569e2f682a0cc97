//! Patch requests.
//!
//! A patch is one structured mutation of the binary. The variant set is
//! closed and dispatch is exhaustive; patches interact only through the
//! engine's symbol table and the binary's own bytes, never through each
//! other's state. Each patch is immutable once constructed; the text
//! substitution that happens during apply works on derived copies.

pub mod data;
pub mod instruction;
pub(crate) mod shim;

use crate::engine::PatchEngine;
use crate::error::Result;

pub use self::data::{InsertData, ModifyData, ModifyRawBytes, RemoveData};
pub use self::instruction::{
    CConfig, InsertBody, InsertInstruction, ModifyInstruction, Removal, RemoveInstruction,
};

/// Where a patch goes: a concrete address, or a name under which free
/// space is allocated and published for later patches to reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrRef {
    Addr(u64),
    Name(String),
}

impl From<u64> for AddrRef {
    fn from(addr: u64) -> Self {
        Self::Addr(addr)
    }
}

impl From<&str> for AddrRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for AddrRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// How a raw address is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    /// A memory address, mapped to its file offset before writing.
    Memory,
    /// A raw file offset, used as-is.
    FileOffset,
}

/// A single structured mutation request.
#[derive(Debug, Clone)]
pub enum Patch {
    ModifyRawBytes(ModifyRawBytes),
    ModifyData(ModifyData),
    InsertData(InsertData),
    RemoveData(RemoveData),
    ModifyInstruction(ModifyInstruction),
    InsertInstruction(InsertInstruction),
    RemoveInstruction(RemoveInstruction),
}

impl Patch {
    pub(crate) fn apply(&self, engine: &mut PatchEngine) -> Result<()> {
        match self {
            Patch::ModifyRawBytes(p) => p.apply(engine),
            Patch::ModifyData(p) => p.apply(engine),
            Patch::InsertData(p) => p.apply(engine),
            Patch::RemoveData(p) => p.apply(engine),
            Patch::ModifyInstruction(p) => p.apply(engine),
            Patch::InsertInstruction(p) => p.apply(engine),
            Patch::RemoveInstruction(p) => p.apply(engine),
        }
    }

    /// Variant name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Patch::ModifyRawBytes(_) => "modify_raw_bytes",
            Patch::ModifyData(_) => "modify_data",
            Patch::InsertData(_) => "insert_data",
            Patch::RemoveData(_) => "remove_data",
            Patch::ModifyInstruction(_) => "modify_instruction",
            Patch::InsertInstruction(_) => "insert_instruction",
            Patch::RemoveInstruction(_) => "remove_instruction",
        }
    }
}

impl From<ModifyRawBytes> for Patch {
    fn from(p: ModifyRawBytes) -> Self {
        Self::ModifyRawBytes(p)
    }
}

impl From<ModifyData> for Patch {
    fn from(p: ModifyData) -> Self {
        Self::ModifyData(p)
    }
}

impl From<InsertData> for Patch {
    fn from(p: InsertData) -> Self {
        Self::InsertData(p)
    }
}

impl From<RemoveData> for Patch {
    fn from(p: RemoveData) -> Self {
        Self::RemoveData(p)
    }
}

impl From<ModifyInstruction> for Patch {
    fn from(p: ModifyInstruction) -> Self {
        Self::ModifyInstruction(p)
    }
}

impl From<InsertInstruction> for Patch {
    fn from(p: InsertInstruction) -> Self {
        Self::InsertInstruction(p)
    }
}

impl From<RemoveInstruction> for Patch {
    fn from(p: RemoveInstruction) -> Self {
        Self::RemoveInstruction(p)
    }
}
