//! Symbol table management.
//!
//! Named patches publish the memory addresses of their allocated blocks
//! here; later patches reference them with `{name}` placeholders in their
//! assembly text. The table is owned by the engine and passed by reference
//! into each apply, so independent runs never share state.

use std::collections::HashMap;

use crate::error::{PatchError, Result};

/// How unresolved `{name}` placeholders are handled during interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// Fail, naming the missing symbol.
    Reject,
    /// Substitute zero. Sizing passes use this so a body may reference a
    /// name that is only published once its block address is known.
    Zero,
}

/// Mapping of symbol name to resolved memory address.
///
/// Append-only over a run: patches define names, later patches read them.
/// A later definition of the same name shadows the earlier one.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `name` at `addr`.
    pub fn define(&mut self, name: impl Into<String>, addr: u64) {
        self.entries.insert(name.into(), addr);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A view layering per-patch `overrides` over this table.
    pub fn merged(&self, overrides: &HashMap<String, u64>) -> SymbolTable {
        let mut entries = self.entries.clone();
        for (name, addr) in overrides {
            entries.insert(name.clone(), *addr);
        }
        SymbolTable { entries }
    }
}

/// Expands `{name}` placeholders in `text` to hexadecimal addresses.
///
/// A placeholder is `{` followed by an identifier (ASCII letter or
/// underscore, then letters, digits, underscores) and `}`. Anything else,
/// mismatched braces included, passes through untouched.
pub fn interpolate(text: &str, symbols: &SymbolTable, unresolved: Unresolved) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match placeholder(&rest[open..]) {
            Some((name, consumed)) => {
                let value = match symbols.get(name) {
                    Some(addr) => addr,
                    None => match unresolved {
                        Unresolved::Zero => 0,
                        Unresolved::Reject => {
                            return Err(PatchError::Assembly {
                                context: format!("placeholder {{{name}}}"),
                                source: anyhow::anyhow!(
                                    "symbol `{name}` is not defined by the program or an earlier patch"
                                ),
                            })
                        }
                    },
                };
                out.push_str(&format!("{value:#x}"));
                rest = &rest[open + consumed..];
            }
            None => {
                out.push('{');
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Parses a `{identifier}` placeholder at the start of `text`, returning
/// the identifier and the number of bytes consumed.
fn placeholder(text: &str) -> Option<(&str, usize)> {
    let body = &text[1..];
    let close = body.find('}')?;
    let name = &body[..close];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, close + 2))
}

#[cfg(test)]
mod tests {
    use super::{interpolate, SymbolTable, Unresolved};
    use crate::error::PatchError;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::new();
        t.define("bar", 0x400800);
        t.define("loop_top", 0x1000);
        t
    }

    #[test]
    fn replaces_known_placeholders() {
        let out = interpolate("jmp {bar}\ncall {loop_top}", &table(), Unresolved::Reject).unwrap();
        assert_eq!(out, "jmp 0x400800\ncall 0x1000");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = interpolate("jmp {missing}", &table(), Unresolved::Reject).unwrap_err();
        assert!(matches!(err, PatchError::Assembly { .. }));
        assert!(err.to_string().contains("{missing}"));
    }

    #[test]
    fn zero_mode_substitutes_unknowns() {
        let out = interpolate("load {me}", &table(), Unresolved::Zero).unwrap();
        assert_eq!(out, "load 0x0");
    }

    #[test]
    fn non_identifier_braces_pass_through() {
        let text = "mov rax, {} {1+2} {no-dash}";
        let out = interpolate(text, &table(), Unresolved::Reject).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn overrides_shadow_run_symbols() {
        let merged = table().merged(&[("bar".to_string(), 0x99u64)].into_iter().collect());
        assert_eq!(merged.get("bar"), Some(0x99));
        assert_eq!(merged.get("loop_top"), Some(0x1000));
    }
}
