//! Architecture-neutral register descriptors.

use std::fmt;

use serde::Serialize;

use super::error::JitError;
use super::{aarch64, x86_64};

/// Instruction-set family a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Isa {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "aarch64")]
    AArch64,
}

impl Isa {
    /// Number of registers in the given register file.
    pub fn register_count(self, class: RegClass) -> u8 {
        match self {
            Isa::X86_64 => x86_64::register_count(class),
            Isa::AArch64 => aarch64::register_count(class),
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isa::X86_64 => write!(f, "x86-64"),
            Isa::AArch64 => write!(f, "aarch64"),
        }
    }
}

/// Argument / register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegClass {
    /// Integer and pointer values.
    Int,
    /// Floating-point values.
    Float,
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegClass::Int => write!(f, "integer"),
            RegClass::Float => write!(f, "float"),
        }
    }
}

/// A single physical register.
///
/// The ISA tag ties the descriptor back to the capability table it came
/// from; the code is the architectural register number within its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    isa: Isa,
    class: RegClass,
    code: u8,
}

impl Register {
    /// Build a descriptor without validation. Used by the constant ABI tables.
    pub const fn new(isa: Isa, class: RegClass, code: u8) -> Self {
        Self { isa, class, code }
    }

    /// Build a descriptor, rejecting codes outside the register file.
    pub fn try_new(isa: Isa, class: RegClass, code: u8) -> Result<Self, JitError> {
        if code >= isa.register_count(class) {
            return Err(JitError::UnknownRegister { isa, class, code });
        }
        Ok(Self::new(isa, class, code))
    }

    pub fn isa(self) -> Isa {
        self.isa
    }

    pub fn class(self) -> RegClass {
        self.class
    }

    pub fn code(self) -> u8 {
        self.code
    }

    /// Architectural name, e.g. `rdi`, `xmm3`, `x7`, `d0`.
    pub fn name(self) -> &'static str {
        match self.isa {
            Isa::X86_64 => x86_64::register_name(self.class, self.code),
            Isa::AArch64 => aarch64::register_name(self.class, self.code),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Register {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
