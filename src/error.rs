//! Error types for patch application.
//!
//! Every failure is raised synchronously at the offending patch's apply
//! step and propagates unrecovered; there are no retries and no partial
//! recovery inside the engine. Messages name the violated invariant and
//! the offending address, register, or size.

use thiserror::Error;

use crate::alloc::Perm;

/// Result type alias using the patch error taxonomy.
pub type Result<T> = std::result::Result<T, PatchError>;

/// Errors that can occur while applying patches.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The patch asks for something its apply path cannot honor
    /// (unmappable address, named C insertion, count-only removal,
    /// unknown register).
    #[error("configuration: {0}")]
    Configuration(String),

    /// Applying would violate a byte-layout or register-layout invariant
    /// (non-nop-aligned remainder, overlapping subregisters,
    /// non-canonical subregister, block overflow).
    #[error("consistency: {0}")]
    Consistency(String),

    /// No free region fits the request.
    #[error("allocation: no free {perm} region fits {size} bytes")]
    Allocation {
        size: u64,
        perm: Perm,
        #[source]
        source: anyhow::Error,
    },

    /// Text failed to interpolate, assemble, or compile.
    #[error("assembly failed at {context}")]
    Assembly {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// The detour branch cannot be placed at the requested site.
    #[error("cannot splice detour at {addr:#x}: {reason}")]
    Splice { addr: u64, reason: String },
}
