//! Calling-convention shim synthesis.
//!
//! An author writes a C body keyed to named registers; this module
//! generates the function around it. Registers split three ways: the
//! ABI's argument registers arrive as typed parameters, callee-saved
//! registers stay hidden (the compiler already protects them), and every
//! other register is pinned to its hardware location as a local that the
//! compiler is forced to treat as live on entry. Leaving the body
//! tail-calls a callback with the same argument list, so the spliced code
//! always rejoins the original flow with the live-out registers intact.

use std::collections::{BTreeMap, BTreeSet};

use crate::arch::ArchInfo;
use crate::error::{PatchError, Result};
use crate::patch::instruction::CConfig;

/// Child register name to (bit width, parent register name), built from
/// the descriptor's subregister families. Building the index also
/// enforces the canonical-child rule: a requested register that is not
/// the first-listed child of its width is rejected before anything else
/// happens.
fn parent_index(
    arch: &ArchInfo,
    requested: &BTreeSet<String>,
) -> Result<BTreeMap<String, (u32, String)>> {
    let mut parents = BTreeMap::new();
    for (parent, widths) in arch.subregisters {
        for (bits, children) in *widths {
            for (i, child) in children.iter().enumerate() {
                if i > 0 && requested.contains(*child) {
                    return Err(PatchError::Consistency(format!(
                        "subregister {child} is not individually usable: {} is the only \
                         {bits}-bit subregister of {parent}",
                        children[0]
                    )));
                }
                parents.insert((*child).to_string(), (*bits, (*parent).to_string()));
            }
        }
    }
    Ok(parents)
}

/// Parent register to the narrowed (bits, name) form requested for it.
/// Two requests landing in one parent alias the same bits and are
/// rejected.
fn rewrite_set(
    parents: &BTreeMap<String, (u32, String)>,
    requested: &BTreeSet<String>,
) -> Result<BTreeMap<String, (u32, String)>> {
    let mut rewrites: BTreeMap<String, (u32, String)> = BTreeMap::new();
    for name in requested {
        let (bits, parent) = parents.get(name).ok_or_else(|| {
            PatchError::Configuration(format!("unknown register {name} in subregister request"))
        })?;
        if parent != name {
            if let Some((_, prior)) = rewrites.get(parent) {
                return Err(PatchError::Consistency(format!(
                    "requested subregisters {prior} and {name} overlap within {parent}"
                )));
            }
            rewrites.insert(parent.clone(), (*bits, name.clone()));
        }
    }
    Ok(rewrites)
}

/// Maps each register to its declared (bits, name) form, honoring the
/// rewrite set.
fn narrow<'a>(
    regs: impl Iterator<Item = &'a str>,
    parents: &BTreeMap<String, (u32, String)>,
    rewrites: &BTreeMap<String, (u32, String)>,
    arch_name: &str,
) -> Result<Vec<(u32, String)>> {
    regs.map(|reg| {
        if let Some(slot) = rewrites.get(reg) {
            return Ok(slot.clone());
        }
        parents.get(reg).cloned().ok_or_else(|| {
            PatchError::Configuration(format!(
                "register {reg} has no subregister family in the {arch_name} descriptor"
            ))
        })
    })
    .collect()
}

fn float_type(config: &CConfig, reg: &str) -> String {
    config
        .float_types
        .get(reg)
        .cloned()
        .unwrap_or_else(|| "float".to_string())
}

/// Generates the shim source around `body`.
pub(crate) fn generate(
    arch: &ArchInfo,
    preserve_none: bool,
    body: &str,
    config: &CConfig,
) -> Result<String> {
    // Preserve-none only applies when the target has a reduced convention
    // for the compiler's attribute to mean something.
    let preserve_none = preserve_none && arch.abi_preserve_none.is_some();
    let abi = arch.select_abi(preserve_none);

    let parents = parent_index(arch, &config.sub_regs)?;
    let rewrites = rewrite_set(&parents, &config.sub_regs)?;

    let int_args = narrow(abi.int_args.iter().copied(), &parents, &rewrites, arch.name)?;
    let float_args: Vec<(String, String)> = abi
        .float_args
        .iter()
        .map(|reg| (float_type(config, reg), (*reg).to_string()))
        .collect();

    // Everything outside the convention and the callee-saved set is
    // exposed to the body: live-in always, live-out unless scratch.
    let in_convention: BTreeSet<&str> = abi.int_args.iter().copied().collect();
    let callee_saved: BTreeSet<&str> = abi.callee_saved.iter().copied().collect();
    let extra: Vec<&str> = arch
        .regs
        .iter()
        .copied()
        .filter(|reg| !in_convention.contains(reg) && !callee_saved.contains(reg))
        .collect();
    let extra_in = narrow(extra.iter().copied(), &parents, &rewrites, arch.name)?;
    let extra_out = narrow(
        extra
            .iter()
            .copied()
            .filter(|reg| !config.scratch_regs.contains(*reg)),
        &parents,
        &rewrites,
        arch.name,
    )?;

    let in_convention_f: BTreeSet<&str> = abi.float_args.iter().copied().collect();
    let callee_saved_f: BTreeSet<&str> = abi.callee_saved_float.iter().copied().collect();
    let extra_f: Vec<&str> = arch
        .regs_float
        .iter()
        .copied()
        .filter(|reg| !in_convention_f.contains(reg) && !callee_saved_f.contains(reg))
        .collect();
    let extra_f_in: Vec<(String, String)> = extra_f
        .iter()
        .map(|reg| (float_type(config, reg), (*reg).to_string()))
        .collect();
    let extra_f_out: Vec<(String, String)> = extra_f
        .iter()
        .filter(|reg| !config.scratch_regs.contains(**reg))
        .map(|reg| (float_type(config, reg), (*reg).to_string()))
        .collect();

    let attribute = if preserve_none {
        "__attribute__((preserve_none)) "
    } else {
        ""
    };

    let mut args: Vec<String> = int_args
        .iter()
        .map(|(bits, name)| format!("uint{bits}_t {name}"))
        .collect();
    args.extend(float_args.iter().map(|(ty, name)| format!("{ty} {name}")));
    let args_str = args.join(", ");

    // The `return` macro keeps every live-out register pinned until the
    // moment of the tail call, then dispatches. Scratch slots pass a
    // throwaway local instead of the register.
    let mut macro_lines = vec!["#define return do {".to_string()];
    for (_, name) in &extra_out {
        macro_lines.push(format!("    asm (\"\" : : \"r\"({name}) :);"));
    }
    for (_, name) in &extra_f_out {
        macro_lines.push(format!("    asm (\"\" : : \"r\"({name}) :);"));
    }
    let mut callback_args: Vec<&str> = int_args
        .iter()
        .map(|(_, name)| {
            if config.scratch_regs.contains(name) {
                "_dummy"
            } else {
                name.as_str()
            }
        })
        .collect();
    callback_args.extend(float_args.iter().map(|(_, name)| {
        if config.scratch_regs.contains(name) {
            "_dummyFloat"
        } else {
            name.as_str()
        }
    }));
    macro_lines.push(format!(
        "    __attribute__((musttail)) return _CALLBACK({});",
        callback_args.join(", ")
    ));
    macro_lines.push("} while(0)".to_string());

    let mut lines = vec![
        "#include <stdint.h>".to_string(),
        String::new(),
        format!("extern void {attribute}_CALLBACK({args_str});"),
        String::new(),
    ];
    if !config.forward_header.is_empty() {
        lines.push(config.forward_header.clone());
        lines.push(String::new());
    }
    lines.push(macro_lines.join("\\\n"));
    lines.push(String::new());
    lines.push(format!("void {attribute}_MICROPATCH({args_str}) {{"));
    lines.push(format!("    uint{}_t _dummy;", arch.bits));
    lines.push("    float _dummyFloat;".to_string());
    for (bits, name) in &extra_in {
        lines.push(format!("    register uint{bits}_t {name} asm(\"{name}\");"));
    }
    for (ty, name) in &extra_f_in {
        lines.push(format!("    register {ty} {name} asm(\"{name}\");"));
    }
    // An empty-constraint output makes the compiler treat each pinned
    // local as already holding a value on entry.
    for (_, name) in &extra_in {
        lines.push(format!("    asm (\"\" : \"=r\"({name}) : : );"));
    }
    for (_, name) in &extra_f_in {
        lines.push(format!("    asm (\"\" : \"=r\"({name}) : : );"));
    }
    lines.push(body.to_string());
    // The callback must run even if the author never writes `return`.
    lines.push("    return;".to_string());
    lines.push("}".to_string());
    lines.push("#undef return".to_string());

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::generate;
    use crate::arch::{aarch64::AARCH64, x86_64::X86_64};
    use crate::error::PatchError;
    use crate::patch::instruction::CConfig;

    fn sub_regs(names: &[&str]) -> CConfig {
        CConfig {
            sub_regs: names.iter().map(|s| s.to_string()).collect(),
            ..CConfig::default()
        }
    }

    #[test]
    fn default_abi_argument_list_follows_convention_order() {
        let source = generate(&X86_64, false, "    return;", &CConfig::default()).unwrap();
        let expected = "_MICROPATCH(uint64_t rdi, uint64_t rsi, uint64_t rdx, uint64_t rcx, \
                        uint64_t r8, uint64_t r9, float xmm0, float xmm1, float xmm2, \
                        float xmm3, float xmm4, float xmm5, float xmm6, float xmm7)";
        assert!(source.contains(expected), "bad argument list:\n{source}");
        // The extra registers are pinned and forced live.
        for reg in ["rax", "r10", "r11"] {
            assert!(source.contains(&format!("register uint64_t {reg} asm(\"{reg}\");")));
            assert!(source.contains(&format!("asm (\"\" : \"=r\"({reg}) : : );")));
        }
        assert!(!source.contains("preserve_none"));
        assert!(source.ends_with("#undef return"));
    }

    #[test]
    fn preserve_none_reshapes_arguments_and_extras() {
        let source = generate(&X86_64, true, "    return;", &CConfig::default()).unwrap();
        assert!(source.contains(
            "_MICROPATCH(uint64_t r12, uint64_t r13, uint64_t r14, uint64_t r15, uint64_t rdi"
        ));
        assert!(source.contains("__attribute__((preserve_none)) _CALLBACK"));
        for reg in ["rbx", "r10"] {
            assert!(source.contains(&format!("register uint64_t {reg} asm(\"{reg}\");")));
        }
        assert!(!source.contains("register uint64_t rbp"));
    }

    #[test]
    fn preserve_none_without_a_reduced_convention_falls_back() {
        let source = generate(&AARCH64, true, "    return;", &CConfig::default()).unwrap();
        assert!(source.contains("_MICROPATCH(uint64_t x0, uint64_t x1"));
        assert!(!source.contains("preserve_none"));
    }

    #[test]
    fn canonical_subregister_narrows_its_parent() {
        let source = generate(&X86_64, false, "    return;", &sub_regs(&["eax"])).unwrap();
        assert!(source.contains("register uint32_t eax asm(\"eax\");"));
        assert!(!source.contains("register uint64_t rax"));
    }

    #[test]
    fn requesting_the_parent_changes_nothing() {
        let source = generate(&X86_64, false, "    return;", &sub_regs(&["rax"])).unwrap();
        assert!(source.contains("register uint64_t rax asm(\"rax\");"));
    }

    #[test]
    fn non_canonical_subregister_is_rejected() {
        let err = generate(&X86_64, false, "    return;", &sub_regs(&["ah"])).unwrap_err();
        assert!(matches!(err, PatchError::Consistency(_)));
        assert!(err.to_string().contains("al"));
    }

    #[test]
    fn overlapping_subregisters_are_rejected() {
        let err = generate(&X86_64, false, "    return;", &sub_regs(&["eax", "ax"])).unwrap_err();
        assert!(matches!(err, PatchError::Consistency(_)));
        assert!(err.to_string().contains("rax"));
    }

    #[test]
    fn unknown_register_is_rejected() {
        let err = generate(&X86_64, false, "    return;", &sub_regs(&["zmm9"])).unwrap_err();
        assert!(matches!(err, PatchError::Configuration(_)));
    }

    #[test]
    fn subregister_rewrites_reach_the_argument_list() {
        let source = generate(&X86_64, true, "    return;", &sub_regs(&["r12d"])).unwrap();
        assert!(source.contains("_MICROPATCH(uint32_t r12d, uint64_t r13"));
        assert!(source.contains("_CALLBACK(uint32_t r12d, uint64_t r13"));
    }

    #[test]
    fn scratch_registers_stay_live_in_but_not_live_out() {
        let config = CConfig {
            scratch_regs: ["r10".to_string()].into_iter().collect(),
            ..CConfig::default()
        };
        let source = generate(&X86_64, false, "    return;", &config).unwrap();
        assert!(source.contains("register uint64_t r10 asm(\"r10\");"));
        assert!(!source.contains("asm (\"\" : : \"r\"(r10) :);"));
        assert!(source.contains("asm (\"\" : : \"r\"(rax) :);"));
    }

    #[test]
    fn scratch_convention_registers_pass_placeholders_to_the_callback() {
        let config = CConfig {
            scratch_regs: ["rdi".to_string(), "xmm0".to_string()].into_iter().collect(),
            ..CConfig::default()
        };
        let source = generate(&X86_64, false, "    return;", &config).unwrap();
        assert!(source.contains("return _CALLBACK(_dummy, rsi"));
        assert!(source.contains("r9, _dummyFloat, xmm1"));
    }

    #[test]
    fn float_registers_can_be_retyped() {
        let config = CConfig {
            float_types: [("xmm0".to_string(), "double".to_string())]
                .into_iter()
                .collect(),
            ..CConfig::default()
        };
        let source = generate(&X86_64, false, "    return;", &config).unwrap();
        assert!(source.contains("double xmm0, float xmm1"));
    }

    #[test]
    fn forward_header_lands_before_the_macro() {
        let config = CConfig {
            forward_header: "typedef unsigned long word;".to_string(),
            ..CConfig::default()
        };
        let source = generate(&X86_64, false, "    return;", &config).unwrap();
        let header = source.find("typedef unsigned long word;").unwrap();
        let macro_start = source.find("#define return").unwrap();
        assert!(header < macro_start);
    }

    #[test]
    fn sub_reg_check_runs_before_unknown_register_check() {
        let mut names = BTreeSet::new();
        names.insert("ah".to_string());
        names.insert("zzz".to_string());
        let config = CConfig {
            sub_regs: names,
            ..CConfig::default()
        };
        let err = generate(&X86_64, false, "    return;", &config).unwrap_err();
        assert!(matches!(err, PatchError::Consistency(_)));
    }
}
