//! In-memory fake collaborators for engine-level tests.
//!
//! The fake toolchain speaks a tiny line-oriented dialect with fixed-size
//! encodings, so byte-exact expectations stay readable:
//! - `nop`                -> 0x90
//! - `ret`                -> 0xC3
//! - `pushfq` / `popfq`   -> 0x9C / 0x9D
//! - `push X` / `pop X`   -> 0x50 / 0x58
//! - `jmp <abs>`          -> 0xE9 ++ target as u32 LE   (5 bytes)
//! - `load <abs>`         -> 0x48 ++ target as u64 LE   (9 bytes)
//! - `byte <n>`           -> that byte
//! - `str`/`ldr`/`stp`/`ldp`/`sub`/`add` lines -> 4 zero bytes

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, ensure, Context, Result};

use upatch::alloc::{FreeListAllocator, Perm};
use upatch::analysis::{BasicBlock, BinaryAnalyzer};
use upatch::arch::ArchInfo;
use upatch::engine::{PatchEngine, Toolchain};
use upatch::image::BinaryImage;
use upatch::toolchain::{Assembler, Compiler, CompileOpts, Disassembler, Mode};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn parse_num(token: &str) -> Result<u64> {
    let token = token.trim_end_matches(',');
    if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).context("bad hex literal")
    } else {
        token.parse().context("bad decimal literal")
    }
}

pub struct FakeAssembler;

impl Assembler for FakeAssembler {
    fn assemble(&self, text: &str, _position: Option<u64>, _mode: Mode) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let mnemonic = parts.next().unwrap();
            match mnemonic {
                "nop" => out.push(0x90),
                "ret" => out.push(0xC3),
                "pushfq" => out.push(0x9C),
                "popfq" => out.push(0x9D),
                "push" => out.push(0x50),
                "pop" => out.push(0x58),
                "jmp" => {
                    let target = parse_num(parts.next().context("jmp needs a target")?)?;
                    out.push(0xE9);
                    out.extend((target as u32).to_le_bytes());
                }
                "load" => {
                    let target = parse_num(parts.next().context("load needs a value")?)?;
                    out.push(0x48);
                    out.extend(target.to_le_bytes());
                }
                "byte" => {
                    let value = parse_num(parts.next().context("byte needs a value")?)?;
                    out.push(value as u8);
                }
                "str" | "ldr" | "stp" | "ldp" | "sub" | "add" => {
                    out.extend([0, 0, 0, 0]);
                }
                other => bail!("unknown mnemonic `{other}` in line `{line}`"),
            }
        }
        Ok(out)
    }
}

pub struct FakeDisassembler;

impl Disassembler for FakeDisassembler {
    fn disassemble(&self, bytes: &[u8], _addr: u64, _mode: Mode) -> Result<String> {
        let mut lines = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                0x90 => {
                    lines.push("nop".to_string());
                    i += 1;
                }
                0xC3 => {
                    lines.push("ret".to_string());
                    i += 1;
                }
                0x9C => {
                    lines.push("pushfq".to_string());
                    i += 1;
                }
                0x9D => {
                    lines.push("popfq".to_string());
                    i += 1;
                }
                0x50 => {
                    lines.push("push rax".to_string());
                    i += 1;
                }
                0x58 => {
                    lines.push("pop rax".to_string());
                    i += 1;
                }
                0xE9 => {
                    ensure!(i + 5 <= bytes.len(), "truncated jmp");
                    let target = u32::from_le_bytes(bytes[i + 1..i + 5].try_into().unwrap());
                    lines.push(format!("jmp {target:#x}"));
                    i += 5;
                }
                0x48 => {
                    ensure!(i + 9 <= bytes.len(), "truncated load");
                    let value = u64::from_le_bytes(bytes[i + 1..i + 9].try_into().unwrap());
                    lines.push(format!("load {value:#x}"));
                    i += 9;
                }
                other => {
                    lines.push(format!("byte {other:#x}"));
                    i += 1;
                }
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Records every compile call and returns a canned encoding.
#[derive(Clone)]
pub struct FakeCompiler {
    pub machine_code: Vec<u8>,
    pub preserve_none: bool,
    pub calls: Rc<RefCell<Vec<(String, u64, Option<u64>)>>>,
}

impl FakeCompiler {
    pub fn new(machine_code: Vec<u8>) -> Self {
        Self {
            machine_code,
            preserve_none: false,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Compiler for FakeCompiler {
    fn compile(
        &self,
        source: &str,
        position: u64,
        callback: Option<u64>,
        _opts: &CompileOpts,
    ) -> Result<Vec<u8>> {
        self.calls
            .borrow_mut()
            .push((source.to_string(), position, callback));
        Ok(self.machine_code.clone())
    }

    fn preserve_none(&self) -> bool {
        self.preserve_none
    }
}

/// Scripted analyzer over a flat region: instruction sizes from `base`,
/// linear address-to-offset mapping, one basic block unless overridden.
pub struct FakeAnalyzer {
    pub base: u64,
    pub file_base: u64,
    pub bytes: Vec<u8>,
    pub instr_sizes: Vec<usize>,
    pub blocks: Vec<(u64, u64)>,
    pub mode: Mode,
}

impl FakeAnalyzer {
    pub fn new(base: u64, file_base: u64, bytes: Vec<u8>, instr_sizes: Vec<usize>) -> Self {
        let end = base + bytes.len() as u64;
        Self {
            base,
            file_base,
            bytes,
            instr_sizes,
            blocks: vec![(base, end)],
            mode: Mode::Standard,
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<(u64, u64)>) -> Self {
        self.blocks = blocks;
        self
    }
}

impl BinaryAnalyzer for FakeAnalyzer {
    fn mode_at(&self, _addr: u64) -> Result<Mode> {
        Ok(self.mode)
    }

    fn instruction_bytes_at(&self, addr: u64, count: usize) -> Result<Vec<u8>> {
        ensure!(addr >= self.base, "address {addr:#x} below analyzer base");
        let mut off = 0usize;
        let mut idx = 0usize;
        while (self.base + off as u64) < addr {
            ensure!(
                idx < self.instr_sizes.len(),
                "address {addr:#x} beyond known instructions"
            );
            off += self.instr_sizes[idx];
            idx += 1;
        }
        ensure!(
            self.base + off as u64 == addr,
            "address {addr:#x} is not an instruction boundary"
        );
        let start = off;
        for _ in 0..count {
            ensure!(
                idx < self.instr_sizes.len(),
                "fewer than {count} instructions at {addr:#x}"
            );
            off += self.instr_sizes[idx];
            idx += 1;
        }
        ensure!(off <= self.bytes.len(), "instructions run past known bytes");
        Ok(self.bytes[start..off].to_vec())
    }

    fn basic_block_at(&self, addr: u64) -> Result<BasicBlock> {
        self.blocks
            .iter()
            .find(|(start, end)| addr >= *start && addr < *end)
            .map(|(start, end)| BasicBlock {
                start: *start,
                end: *end,
            })
            .context("no basic block at address")
    }

    fn mem_addr_to_file_offset(&self, addr: u64) -> Result<u64> {
        ensure!(addr >= self.base, "address {addr:#x} below analyzer base");
        Ok(addr - self.base + self.file_base)
    }
}

/// Vec-backed image with a shared handle for post-run inspection.
#[derive(Clone)]
pub struct SharedImage(pub Rc<RefCell<Vec<u8>>>);

impl SharedImage {
    pub fn new(content: Vec<u8>) -> Self {
        Self(Rc::new(RefCell::new(content)))
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn slice(&self, start: usize, len: usize) -> Vec<u8> {
        self.0.borrow()[start..start + len].to_vec()
    }
}

impl BinaryImage for SharedImage {
    fn update_content(&mut self, file_offset: u64, bytes: &[u8]) -> Result<()> {
        let mut content = self.0.borrow_mut();
        let start = file_offset as usize;
        let end = start + bytes.len();
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// Free regions as (mem_addr, file_offset, size, perm).
pub type Regions = [(u64, u64, u64, Perm)];

pub fn engine(
    arch: &ArchInfo,
    analyzer: FakeAnalyzer,
    image: SharedImage,
    regions: &Regions,
) -> PatchEngine {
    engine_with_compiler(arch, analyzer, image, regions, FakeCompiler::new(vec![]))
}

pub fn engine_with_compiler(
    arch: &ArchInfo,
    analyzer: FakeAnalyzer,
    image: SharedImage,
    regions: &Regions,
    compiler: FakeCompiler,
) -> PatchEngine {
    init_tracing();
    let mut allocator = FreeListAllocator::new();
    for &(mem_addr, file_offset, size, perm) in regions {
        allocator.add_region(mem_addr, file_offset, size, perm);
    }
    PatchEngine::new(
        arch.clone(),
        Toolchain {
            assembler: Box::new(FakeAssembler),
            disassembler: Box::new(FakeDisassembler),
            compiler: Box::new(compiler),
        },
        Box::new(analyzer),
        Box::new(image),
        Box::new(allocator),
    )
}
