//! AArch64 descriptor (AAPCS64).

use super::{Abi, ArchInfo, SubRegisterFamily};

const SUBREGISTERS: &[SubRegisterFamily] = &[
    ("x0", &[(64, &["x0"]), (32, &["w0"])]),
    ("x1", &[(64, &["x1"]), (32, &["w1"])]),
    ("x2", &[(64, &["x2"]), (32, &["w2"])]),
    ("x3", &[(64, &["x3"]), (32, &["w3"])]),
    ("x4", &[(64, &["x4"]), (32, &["w4"])]),
    ("x5", &[(64, &["x5"]), (32, &["w5"])]),
    ("x6", &[(64, &["x6"]), (32, &["w6"])]),
    ("x7", &[(64, &["x7"]), (32, &["w7"])]),
    ("x8", &[(64, &["x8"]), (32, &["w8"])]),
    ("x9", &[(64, &["x9"]), (32, &["w9"])]),
    ("x10", &[(64, &["x10"]), (32, &["w10"])]),
    ("x11", &[(64, &["x11"]), (32, &["w11"])]),
    ("x12", &[(64, &["x12"]), (32, &["w12"])]),
    ("x13", &[(64, &["x13"]), (32, &["w13"])]),
    ("x14", &[(64, &["x14"]), (32, &["w14"])]),
    ("x15", &[(64, &["x15"]), (32, &["w15"])]),
    ("x16", &[(64, &["x16"]), (32, &["w16"])]),
    ("x17", &[(64, &["x17"]), (32, &["w17"])]),
    ("x18", &[(64, &["x18"]), (32, &["w18"])]),
    ("x19", &[(64, &["x19"]), (32, &["w19"])]),
    ("x20", &[(64, &["x20"]), (32, &["w20"])]),
    ("x21", &[(64, &["x21"]), (32, &["w21"])]),
    ("x22", &[(64, &["x22"]), (32, &["w22"])]),
    ("x23", &[(64, &["x23"]), (32, &["w23"])]),
    ("x24", &[(64, &["x24"]), (32, &["w24"])]),
    ("x25", &[(64, &["x25"]), (32, &["w25"])]),
    ("x26", &[(64, &["x26"]), (32, &["w26"])]),
    ("x27", &[(64, &["x27"]), (32, &["w27"])]),
    ("x28", &[(64, &["x28"]), (32, &["w28"])]),
    ("x29", &[(64, &["x29"]), (32, &["w29"])]),
    ("x30", &[(64, &["x30"]), (32, &["w30"])]),
];

const SAVE_CONTEXT: &str = "\
sub sp, sp, #0x100
stp x0, x1, [sp]
stp x2, x3, [sp, #0x10]
stp x4, x5, [sp, #0x20]
stp x6, x7, [sp, #0x30]
stp x8, x9, [sp, #0x40]
stp x10, x11, [sp, #0x50]
stp x12, x13, [sp, #0x60]
stp x14, x15, [sp, #0x70]
stp x16, x17, [sp, #0x80]
stp x18, x19, [sp, #0x90]
stp x20, x21, [sp, #0xa0]
stp x22, x23, [sp, #0xb0]
stp x24, x25, [sp, #0xc0]
stp x26, x27, [sp, #0xd0]
stp x28, x29, [sp, #0xe0]
str x30, [sp, #0xf0]";

const RESTORE_CONTEXT: &str = "\
ldr x30, [sp, #0xf0]
ldp x28, x29, [sp, #0xe0]
ldp x26, x27, [sp, #0xd0]
ldp x24, x25, [sp, #0xc0]
ldp x22, x23, [sp, #0xb0]
ldp x20, x21, [sp, #0xa0]
ldp x18, x19, [sp, #0x90]
ldp x16, x17, [sp, #0x80]
ldp x14, x15, [sp, #0x70]
ldp x12, x13, [sp, #0x60]
ldp x10, x11, [sp, #0x50]
ldp x8, x9, [sp, #0x40]
ldp x6, x7, [sp, #0x30]
ldp x4, x5, [sp, #0x20]
ldp x2, x3, [sp, #0x10]
ldp x0, x1, [sp]
add sp, sp, #0x100";

pub static AARCH64: ArchInfo = ArchInfo {
    name: "aarch64",
    bits: 64,
    alignment: 4,
    nop_bytes: &[0x1f, 0x20, 0x03, 0xd5],
    variable_length_isa: false,
    branch_asm: "b {dst}",
    branch_size: 4,
    regs: &[
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
        "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
        "x27", "x28", "x29", "x30",
    ],
    regs_float: &[
        "v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "v10", "v11", "v12", "v13",
        "v14", "v15", "v16", "v17", "v18", "v19", "v20", "v21", "v22", "v23", "v24", "v25", "v26",
        "v27", "v28", "v29", "v30", "v31",
    ],
    subregisters: SUBREGISTERS,
    save_context_asm: SAVE_CONTEXT,
    restore_context_asm: RESTORE_CONTEXT,
    abi: Abi {
        int_args: &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        float_args: &["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7"],
        callee_saved: &[
            "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27", "x28", "x29",
        ],
        callee_saved_float: &["v8", "v9", "v10", "v11", "v12", "v13", "v14", "v15"],
    },
    abi_preserve_none: None,
};
