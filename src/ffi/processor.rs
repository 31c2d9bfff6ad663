//! Register queries for the host calling convention.
//!
//! Registers cross the boundary as their architectural code (`uint8_t`);
//! integer and float codes live in separate register files.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::VasmResult;
use crate::jit::{HostProcessor, RegClass, Register};

const HOST: HostProcessor = HostProcessor::host();

#[unsafe(no_mangle)]
pub extern "C" fn vasm_max_int_args() -> u32 {
    HOST.max_int_args() as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_max_float_args() -> u32 {
    HOST.max_float_args() as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_is_int_arg_register(index: u32) -> bool {
    HOST.is_int_arg_register(index as usize)
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_is_float_arg_register(index: u32) -> bool {
    HOST.is_float_arg_register(index as usize)
}

/// Write the register code for integer argument `index` to `out`.
///
/// Returns `ErrOutOfRange` (leaving `out` untouched) when the argument is
/// not passed in a register.
///
/// # Safety
/// `out` must be NULL or valid for a one-byte write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_int_arg(index: u32, out: *mut u8) -> VasmResult {
    store(HOST.int_arg(index as usize), out)
}

/// Float counterpart of [`vasm_int_arg`].
///
/// # Safety
/// `out` must be NULL or valid for a one-byte write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_float_arg(index: u32, out: *mut u8) -> VasmResult {
    store(HOST.float_arg(index as usize), out)
}

/// Register code for integer argument `index`, or `default_code`.
#[unsafe(no_mangle)]
pub extern "C" fn vasm_int_arg_or(index: u32, default_code: u8) -> u8 {
    let default = Register::new(HOST.isa(), RegClass::Int, default_code);
    HOST.int_arg_or(index as usize, default).code()
}

/// Register code for float argument `index`, or `default_code`.
#[unsafe(no_mangle)]
pub extern "C" fn vasm_float_arg_or(index: u32, default_code: u8) -> u8 {
    let default = Register::new(HOST.isa(), RegClass::Float, default_code);
    HOST.float_arg_or(index as usize, default).code()
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_int_return() -> u8 {
    HOST.int_return().code()
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_float_return() -> u8 {
    HOST.float_return().code()
}

unsafe fn store(reg: Result<Register, crate::jit::JitError>, out: *mut u8) -> VasmResult {
    if out.is_null() {
        return VasmResult::ErrNull;
    }
    match reg {
        Ok(reg) => {
            *out = reg.code();
            VasmResult::Ok
        }
        Err(e) => VasmResult::from(&e),
    }
}
