//! AArch64 register file and the AAPCS64 procedure call standard.
//!
//! The probe encoder at the bottom only knows what the add thunk needs.

use super::abi::CallingConvention;
use super::codebuf::CodeBuffer;
use super::register::{Isa, RegClass, Register};

/// AArch64 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    X0 = 0, X1 = 1, X2 = 2, X3 = 3,
    X4 = 4, X5 = 5, X6 = 6, X7 = 7,
    X8 = 8, X9 = 9, X10 = 10, X11 = 11,
    X12 = 12, X13 = 13, X14 = 14, X15 = 15,
    X16 = 16, X17 = 17, X18 = 18, X19 = 19,
    X20 = 20, X21 = 21, X22 = 22, X23 = 23,
    X24 = 24, X25 = 25, X26 = 26, X27 = 27,
    X28 = 28,
    Fp = 29,  // Frame pointer
    Lr = 30,  // Link register
    Sp = 31,  // Stack pointer / Zero register (XZR in some contexts)
}

impl Reg {
    /// Alias for SP when used as zero register
    pub const XZR: Reg = Reg::Sp;

    pub fn code(self) -> u8 {
        self as u8
    }

    pub const fn descriptor(self) -> Register {
        Register::new(Isa::AArch64, RegClass::Int, self as u8)
    }
}

const GPR_NAMES: [&str; 32] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7",
    "x8", "x9", "x10", "x11", "x12", "x13", "x14", "x15",
    "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23",
    "x24", "x25", "x26", "x27", "x28", "fp", "lr", "sp",
];

// Scalar double view of v0..v31.
const FPR_NAMES: [&str; 32] = [
    "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7",
    "d8", "d9", "d10", "d11", "d12", "d13", "d14", "d15",
    "d16", "d17", "d18", "d19", "d20", "d21", "d22", "d23",
    "d24", "d25", "d26", "d27", "d28", "d29", "d30", "d31",
];

pub(crate) fn register_count(class: RegClass) -> u8 {
    match class {
        RegClass::Int => GPR_NAMES.len() as u8,
        RegClass::Float => FPR_NAMES.len() as u8,
    }
}

pub(crate) fn register_name(class: RegClass, code: u8) -> &'static str {
    let names = match class {
        RegClass::Int => &GPR_NAMES,
        RegClass::Float => &FPR_NAMES,
    };
    names.get(code as usize).copied().unwrap_or("?")
}

const fn d(n: u8) -> Register {
    Register::new(Isa::AArch64, RegClass::Float, n)
}

/// AAPCS64 (Linux) and the Apple arm64 variant; they agree on register
/// assignment for the first eight arguments of each class.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aapcs64;

impl CallingConvention for Aapcs64 {
    const ISA: Isa = Isa::AArch64;
    const NAME: &'static str = "AAPCS64";
    const INT_ARGS: &'static [Register] = &[
        Reg::X0.descriptor(),
        Reg::X1.descriptor(),
        Reg::X2.descriptor(),
        Reg::X3.descriptor(),
        Reg::X4.descriptor(),
        Reg::X5.descriptor(),
        Reg::X6.descriptor(),
        Reg::X7.descriptor(),
    ];
    const FLOAT_ARGS: &'static [Register] = &[
        d(0), d(1), d(2), d(3),
        d(4), d(5), d(6), d(7),
    ];
    const INT_RETURN: Register = Reg::X0.descriptor();
    const FLOAT_RETURN: Register = d(0);
}

/// Minimal AArch64 encoder for probe thunks.
pub struct ProbeAssembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> ProbeAssembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    pub fn emit_raw(&mut self, inst: u32) {
        self.buf.emit_u32(inst);
    }

    /// ADD Xd, Xn, Xm (64-bit add)
    pub fn add(&mut self, rd: Reg, rn: Reg, rm: Reg) {
        // 1000 1011 000m mmmm 0000 00nn nnnd dddd
        let inst = 0x8B000000
            | ((rm.code() as u32) << 16)
            | ((rn.code() as u32) << 5)
            | (rd.code() as u32);
        self.emit_raw(inst);
    }

    /// MOV Xd, Xm
    pub fn mov(&mut self, rd: Reg, rm: Reg) {
        // ORR Xd, XZR, Xm
        let inst = 0xAA000000
            | ((rm.code() as u32) << 16)
            | ((Reg::XZR.code() as u32) << 5)
            | (rd.code() as u32);
        self.emit_raw(inst);
    }

    /// RET (X30)
    pub fn ret(&mut self) {
        self.emit_raw(0xD65F03C0);
    }
}

impl Reg {
    /// Inverse of [`Reg::descriptor`].
    pub fn from_descriptor(reg: Register) -> Option<Reg> {
        if reg.isa() != Isa::AArch64 || reg.class() != RegClass::Int || reg.code() > 31 {
            return None;
        }
        // SAFETY: Reg is repr(u8) with every value in 0..=31 populated.
        Some(unsafe { std::mem::transmute::<u8, Reg>(reg.code()) })
    }
}
