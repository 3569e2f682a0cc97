//! x86_64 descriptor (SysV, with the clang preserve-none variant).

use super::{Abi, ArchInfo, SubRegisterFamily};

const SUBREGISTERS: &[SubRegisterFamily] = &[
    ("rax", &[(64, &["rax"]), (32, &["eax"]), (16, &["ax"]), (8, &["al", "ah"])]),
    ("rbx", &[(64, &["rbx"]), (32, &["ebx"]), (16, &["bx"]), (8, &["bl", "bh"])]),
    ("rcx", &[(64, &["rcx"]), (32, &["ecx"]), (16, &["cx"]), (8, &["cl", "ch"])]),
    ("rdx", &[(64, &["rdx"]), (32, &["edx"]), (16, &["dx"]), (8, &["dl", "dh"])]),
    ("rsi", &[(64, &["rsi"]), (32, &["esi"]), (16, &["si"]), (8, &["sil"])]),
    ("rdi", &[(64, &["rdi"]), (32, &["edi"]), (16, &["di"]), (8, &["dil"])]),
    ("rbp", &[(64, &["rbp"]), (32, &["ebp"]), (16, &["bp"]), (8, &["bpl"])]),
    ("r8", &[(64, &["r8"]), (32, &["r8d"]), (16, &["r8w"]), (8, &["r8b"])]),
    ("r9", &[(64, &["r9"]), (32, &["r9d"]), (16, &["r9w"]), (8, &["r9b"])]),
    ("r10", &[(64, &["r10"]), (32, &["r10d"]), (16, &["r10w"]), (8, &["r10b"])]),
    ("r11", &[(64, &["r11"]), (32, &["r11d"]), (16, &["r11w"]), (8, &["r11b"])]),
    ("r12", &[(64, &["r12"]), (32, &["r12d"]), (16, &["r12w"]), (8, &["r12b"])]),
    ("r13", &[(64, &["r13"]), (32, &["r13d"]), (16, &["r13w"]), (8, &["r13b"])]),
    ("r14", &[(64, &["r14"]), (32, &["r14d"]), (16, &["r14w"]), (8, &["r14b"])]),
    ("r15", &[(64, &["r15"]), (32, &["r15d"]), (16, &["r15w"]), (8, &["r15b"])]),
];

const SAVE_CONTEXT: &str = "\
pushfq
push rax
push rbx
push rcx
push rdx
push rsi
push rdi
push rbp
push r8
push r9
push r10
push r11
push r12
push r13
push r14
push r15";

const RESTORE_CONTEXT: &str = "\
pop r15
pop r14
pop r13
pop r12
pop r11
pop r10
pop r9
pop r8
pop rbp
pop rdi
pop rsi
pop rdx
pop rcx
pop rbx
pop rax
popfq";

pub static X86_64: ArchInfo = ArchInfo {
    name: "x86_64",
    bits: 64,
    alignment: 16,
    nop_bytes: &[0x90],
    variable_length_isa: true,
    branch_asm: "jmp {dst}",
    branch_size: 5,
    regs: &[
        "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "r8", "r9", "r10", "r11", "r12", "r13",
        "r14", "r15",
    ],
    regs_float: &[
        "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
        "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
    ],
    subregisters: SUBREGISTERS,
    save_context_asm: SAVE_CONTEXT,
    restore_context_asm: RESTORE_CONTEXT,
    abi: Abi {
        int_args: &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
        float_args: &["xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7"],
        callee_saved: &["rbx", "rbp", "r12", "r13", "r14", "r15"],
        callee_saved_float: &[],
    },
    // clang's preserve_none: most of the callee-saved set becomes argument
    // registers, leaving only rbp (and the stack pointer) protected.
    abi_preserve_none: Some(Abi {
        int_args: &[
            "r12", "r13", "r14", "r15", "rdi", "rsi", "rdx", "rcx", "r8", "r9", "r11", "rax",
        ],
        float_args: &["xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7"],
        callee_saved: &["rbp"],
        callee_saved_float: &[],
    }),
};
