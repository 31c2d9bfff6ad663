//! Processor capability tables.
//!
//! A [`CallingConvention`] describes which registers carry arguments and
//! return values under one 64-bit ABI. Exactly one of them is the host
//! convention; the choice is made by `cfg` at build time and there is no
//! runtime dispatch on the host architecture.
//!
//! [`Processor`] is the value an emitter holds on to. It is zero-sized and
//! meant to be built once (`Processor::host()`) and passed by reference.

use std::marker::PhantomData;

use serde::Serialize;

use super::error::JitError;
use super::register::{Isa, RegClass, Register};

/// Register assignment of a native 64-bit calling convention.
///
/// Tables are constant data; nothing may mutate them at runtime.
pub trait CallingConvention: 'static {
    const ISA: Isa;
    const NAME: &'static str;
    /// Integer/pointer argument registers, in argument order.
    const INT_ARGS: &'static [Register];
    /// Floating-point argument registers, in argument order.
    const FLOAT_ARGS: &'static [Register];
    const INT_RETURN: Register;
    const FLOAT_RETURN: Register;
}

#[cfg(target_arch = "x86_64")]
pub type HostConvention = super::x86_64::SysV64;

#[cfg(target_arch = "aarch64")]
pub type HostConvention = super::aarch64::Aapcs64;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("vasm supports only x86_64 and aarch64 hosts");

/// Register queries for one calling convention.
pub struct Processor<C: CallingConvention = HostConvention> {
    _convention: PhantomData<C>,
}

/// Processor for the architecture this binary was built for.
pub type HostProcessor = Processor<HostConvention>;

impl Processor<HostConvention> {
    pub const fn host() -> Self {
        Self::new()
    }
}

impl<C: CallingConvention> Processor<C> {
    pub const fn new() -> Self {
        Self {
            _convention: PhantomData,
        }
    }

    pub fn isa(&self) -> Isa {
        C::ISA
    }

    pub fn convention_name(&self) -> &'static str {
        C::NAME
    }

    pub fn max_int_args(&self) -> usize {
        C::INT_ARGS.len()
    }

    pub fn max_float_args(&self) -> usize {
        C::FLOAT_ARGS.len()
    }

    pub fn is_int_arg_register(&self, index: usize) -> bool {
        index < self.max_int_args()
    }

    pub fn is_float_arg_register(&self, index: usize) -> bool {
        index < self.max_float_args()
    }

    /// Register carrying integer argument `index`.
    ///
    /// An index past the register-passed arguments is a caller bug; check
    /// [`is_int_arg_register`](Self::is_int_arg_register) first, or use
    /// [`int_arg_or`](Self::int_arg_or) when a stack fallback exists.
    pub fn int_arg(&self, index: usize) -> Result<Register, JitError> {
        lookup(C::INT_ARGS, RegClass::Int, index)
    }

    /// Register carrying float argument `index`. See [`int_arg`](Self::int_arg).
    pub fn float_arg(&self, index: usize) -> Result<Register, JitError> {
        lookup(C::FLOAT_ARGS, RegClass::Float, index)
    }

    /// Like [`int_arg`](Self::int_arg), but yields `default` when `index` is
    /// not passed in a register.
    pub fn int_arg_or(&self, index: usize, default: Register) -> Register {
        C::INT_ARGS.get(index).copied().unwrap_or(default)
    }

    pub fn float_arg_or(&self, index: usize, default: Register) -> Register {
        C::FLOAT_ARGS.get(index).copied().unwrap_or(default)
    }

    pub fn int_return(&self) -> Register {
        C::INT_RETURN
    }

    pub fn float_return(&self) -> Register {
        C::FLOAT_RETURN
    }

    /// Snapshot of the whole table, for diagnostics.
    pub fn describe(&self) -> AbiReport {
        AbiReport {
            isa: C::ISA,
            convention: C::NAME,
            int_args: C::INT_ARGS.to_vec(),
            float_args: C::FLOAT_ARGS.to_vec(),
            int_return: C::INT_RETURN,
            float_return: C::FLOAT_RETURN,
        }
    }
}

impl<C: CallingConvention> Default for Processor<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CallingConvention> Clone for Processor<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: CallingConvention> Copy for Processor<C> {}

impl<C: CallingConvention> std::fmt::Debug for Processor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("isa", &C::ISA)
            .field("convention", &C::NAME)
            .finish()
    }
}

fn lookup(table: &[Register], class: RegClass, index: usize) -> Result<Register, JitError> {
    table.get(index).copied().ok_or(JitError::ArgumentOutOfRange {
        class,
        index,
        max: table.len(),
    })
}

/// Serializable view of a calling convention.
#[derive(Debug, Clone, Serialize)]
pub struct AbiReport {
    pub isa: Isa,
    pub convention: &'static str,
    pub int_args: Vec<Register>,
    pub float_args: Vec<Register>,
    pub int_return: Register,
    pub float_return: Register,
}
