//! ARM (AArch32) descriptor.
//!
//! Thumb interworking makes this a variable-length target: 2- and 4-byte
//! encodings mix within a function, so instruction overwrites go through
//! the nop-padding consistency check. The context save avoids register
//! lists so the text survives placeholder interpolation untouched.

use super::{Abi, ArchInfo, SubRegisterFamily};

const SUBREGISTERS: &[SubRegisterFamily] = &[
    ("r0", &[(32, &["r0"])]),
    ("r1", &[(32, &["r1"])]),
    ("r2", &[(32, &["r2"])]),
    ("r3", &[(32, &["r3"])]),
    ("r4", &[(32, &["r4"])]),
    ("r5", &[(32, &["r5"])]),
    ("r6", &[(32, &["r6"])]),
    ("r7", &[(32, &["r7"])]),
    ("r8", &[(32, &["r8"])]),
    ("r9", &[(32, &["r9"])]),
    ("r10", &[(32, &["r10"])]),
    ("r11", &[(32, &["r11"])]),
    ("r12", &[(32, &["r12"])]),
];

const SAVE_CONTEXT: &str = "\
str r0, [sp, #-4]!
str r1, [sp, #-4]!
str r2, [sp, #-4]!
str r3, [sp, #-4]!
str r4, [sp, #-4]!
str r5, [sp, #-4]!
str r6, [sp, #-4]!
str r7, [sp, #-4]!
str r8, [sp, #-4]!
str r9, [sp, #-4]!
str r10, [sp, #-4]!
str r11, [sp, #-4]!
str r12, [sp, #-4]!";

const RESTORE_CONTEXT: &str = "\
ldr r12, [sp], #4
ldr r11, [sp], #4
ldr r10, [sp], #4
ldr r9, [sp], #4
ldr r8, [sp], #4
ldr r7, [sp], #4
ldr r6, [sp], #4
ldr r5, [sp], #4
ldr r4, [sp], #4
ldr r3, [sp], #4
ldr r2, [sp], #4
ldr r1, [sp], #4
ldr r0, [sp], #4";

pub static ARM: ArchInfo = ArchInfo {
    name: "arm",
    bits: 32,
    alignment: 4,
    nop_bytes: &[0x00, 0xf0, 0x20, 0xe3],
    variable_length_isa: true,
    branch_asm: "b {dst}",
    branch_size: 4,
    regs: &[
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12",
    ],
    regs_float: &[
        "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12", "s13",
        "s14", "s15", "s16", "s17", "s18", "s19", "s20", "s21", "s22", "s23", "s24", "s25", "s26",
        "s27", "s28", "s29", "s30", "s31",
    ],
    subregisters: SUBREGISTERS,
    save_context_asm: SAVE_CONTEXT,
    restore_context_asm: RESTORE_CONTEXT,
    abi: Abi {
        int_args: &["r0", "r1", "r2", "r3"],
        float_args: &[
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12",
            "s13", "s14", "s15",
        ],
        callee_saved: &["r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11"],
        callee_saved_float: &[
            "s16", "s17", "s18", "s19", "s20", "s21", "s22", "s23", "s24", "s25", "s26", "s27",
            "s28", "s29", "s30", "s31",
        ],
    },
    abi_preserve_none: None,
};
