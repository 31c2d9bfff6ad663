//! x86-64 register file and System V AMD64 calling convention.
//!
//! Also carries the handful of encodings the probe thunk needs; full
//! instruction selection lives in the emitter, not here.

use super::abi::CallingConvention;
use super::codebuf::CodeBuffer;
use super::register::{Isa, RegClass, Register};

/// x86-64 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,  // Return value
    Rcx = 1,  // 4th argument
    Rdx = 2,  // 3rd argument
    Rbx = 3,  // Callee-saved
    Rsp = 4,  // Stack pointer
    Rbp = 5,  // Frame pointer (callee-saved)
    Rsi = 6,  // 2nd argument
    Rdi = 7,  // 1st argument
    R8 = 8,   // 5th argument
    R9 = 9,   // 6th argument
    R10 = 10, // Caller-saved
    R11 = 11, // Caller-saved
    R12 = 12, // Callee-saved
    R13 = 13, // Callee-saved
    R14 = 14, // Callee-saved
    R15 = 15, // Callee-saved
}

impl Reg {
    /// Low 3 bits used in ModR/M.
    pub fn code(self) -> u8 {
        (self as u8) & 0x7
    }

    pub fn needs_rex_ext(self) -> bool {
        (self as u8) >= 8
    }

    /// REX.B bit for this register (when used as base/rm).
    pub fn rex_b(self) -> u8 {
        if self.needs_rex_ext() { 0x01 } else { 0x00 }
    }

    /// REX.R bit for this register (when used as reg).
    pub fn rex_r(self) -> u8 {
        if self.needs_rex_ext() { 0x04 } else { 0x00 }
    }

    pub const fn descriptor(self) -> Register {
        Register::new(Isa::X86_64, RegClass::Int, self as u8)
    }

    /// Inverse of [`Reg::descriptor`].
    pub fn from_descriptor(reg: Register) -> Option<Reg> {
        if reg.isa() != Isa::X86_64 || reg.class() != RegClass::Int {
            return None;
        }
        GPRS.get(reg.code() as usize).copied()
    }
}

const GPRS: [Reg; 16] = [
    Reg::Rax, Reg::Rcx, Reg::Rdx, Reg::Rbx,
    Reg::Rsp, Reg::Rbp, Reg::Rsi, Reg::Rdi,
    Reg::R8, Reg::R9, Reg::R10, Reg::R11,
    Reg::R12, Reg::R13, Reg::R14, Reg::R15,
];

const GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi",
    "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7",
    "xmm8", "xmm9", "xmm10", "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

pub(crate) fn register_count(class: RegClass) -> u8 {
    match class {
        RegClass::Int => GPR_NAMES.len() as u8,
        RegClass::Float => XMM_NAMES.len() as u8,
    }
}

pub(crate) fn register_name(class: RegClass, code: u8) -> &'static str {
    let names = match class {
        RegClass::Int => &GPR_NAMES,
        RegClass::Float => &XMM_NAMES,
    };
    names.get(code as usize).copied().unwrap_or("?")
}

const fn xmm(n: u8) -> Register {
    Register::new(Isa::X86_64, RegClass::Float, n)
}

/// System V AMD64 ABI, as used on Linux and macOS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysV64;

impl CallingConvention for SysV64 {
    const ISA: Isa = Isa::X86_64;
    const NAME: &'static str = "System V AMD64";
    const INT_ARGS: &'static [Register] = &[
        Reg::Rdi.descriptor(),
        Reg::Rsi.descriptor(),
        Reg::Rdx.descriptor(),
        Reg::Rcx.descriptor(),
        Reg::R8.descriptor(),
        Reg::R9.descriptor(),
    ];
    const FLOAT_ARGS: &'static [Register] = &[
        xmm(0), xmm(1), xmm(2), xmm(3),
        xmm(4), xmm(5), xmm(6), xmm(7),
    ];
    const INT_RETURN: Register = Reg::Rax.descriptor();
    const FLOAT_RETURN: Register = xmm(0);
}

/// Minimal x86-64 encoder for probe thunks.
pub struct ProbeAssembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> ProbeAssembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    /// REX.W prefix for 64-bit operations.
    fn emit_rex_w(&mut self, reg: Reg, rm: Reg) {
        let rex = 0x48 | reg.rex_r() | rm.rex_b();
        self.buf.emit_u8(rex);
    }

    /// mod: 2 bits, reg: 3 bits, rm: 3 bits
    fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
        ((mode & 0x3) << 6) | ((reg & 0x7) << 3) | (rm & 0x7)
    }

    /// MOV r64, r64
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x89); // MOV r/m64, r64
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// ADD r64, r64
    pub fn add_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x01); // ADD r/m64, r64
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }
}
