//! FFI type definitions for the C API.

use crate::jit::JitError;

/// Status codes returned by fallible FFI calls.
///
/// These map to the `VasmResult` enum in `vasm.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VasmResult {
    /// Operation succeeded
    Ok = 0,
    /// Argument index not passed in a register
    ErrOutOfRange = 1,
    /// Page already finalized
    ErrFinalized = 2,
    /// Write past the end of the page
    ErrOutOfBounds = 3,
    /// Zero or overflowing size
    ErrInvalidSize = 4,
    /// A required pointer was NULL
    ErrNull = 5,
    /// The operating system refused a mapping or protection change
    ErrOs = 6,
}

impl From<&JitError> for VasmResult {
    fn from(err: &JitError) -> Self {
        match err {
            JitError::ArgumentOutOfRange { .. } | JitError::UnknownRegister { .. } => {
                VasmResult::ErrOutOfRange
            }
            JitError::PageFinalized => VasmResult::ErrFinalized,
            JitError::OutOfBounds { .. } => VasmResult::ErrOutOfBounds,
            JitError::InvalidSize(_) => VasmResult::ErrInvalidSize,
            JitError::MapFailed { .. } | JitError::ProtectFailed(_) => VasmResult::ErrOs,
        }
    }
}

impl From<Result<(), JitError>> for VasmResult {
    fn from(result: Result<(), JitError>) -> Self {
        match result {
            Ok(()) => VasmResult::Ok,
            Err(e) => VasmResult::from(&e),
        }
    }
}

/// Opaque code page handle. Each pointer owns one reference.
#[repr(C)]
pub struct VasmCodePage {
    _private: [u8; 0],
}

/// Opaque critical section.
#[repr(C)]
pub struct VasmCriticalSection {
    _private: [u8; 0],
}
