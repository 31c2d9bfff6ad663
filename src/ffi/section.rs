//! Critical section FFI.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{VasmCriticalSection, VasmResult};
use crate::jit::CriticalSection;

#[unsafe(no_mangle)]
pub extern "C" fn vasm_critical_section_new() -> *mut VasmCriticalSection {
    Box::into_raw(Box::new(CriticalSection::new())) as *mut VasmCriticalSection
}

/// # Safety
/// `section` must be NULL or come from `vasm_critical_section_new`, must
/// not be held by any thread, and must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_critical_section_free(section: *mut VasmCriticalSection) {
    if !section.is_null() {
        drop(Box::from_raw(section as *mut CriticalSection));
    }
}

/// Block until the calling thread owns `section`.
///
/// Returns `ErrOs` if the thread already owns it.
///
/// # Safety
/// `section` must be NULL or a live pointer from `vasm_critical_section_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_critical_section_enter(section: *mut VasmCriticalSection) -> VasmResult {
    match (section as *const CriticalSection).as_ref() {
        Some(section) => status(section.lock_raw()),
        None => VasmResult::ErrNull,
    }
}

/// Release `section`. Must be called by the thread that entered it.
///
/// # Safety
/// As for [`vasm_critical_section_enter`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_critical_section_leave(section: *mut VasmCriticalSection) -> VasmResult {
    match (section as *const CriticalSection).as_ref() {
        Some(section) => status(section.unlock_raw()),
        None => VasmResult::ErrNull,
    }
}

fn status(rc: i32) -> VasmResult {
    if rc == 0 { VasmResult::Ok } else { VasmResult::ErrOs }
}
