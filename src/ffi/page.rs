//! Code page FFI.
//!
//! A `VasmCodePage*` is one reference to a shared page, the same way the
//! Rust `CodePage` handle is. `vasm_page_grab` adds a reference and
//! `vasm_page_drop` gives one back; the mapping is released with the last.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_void;

use super::types::{VasmCodePage, VasmResult};
use crate::jit::CodePage;

/// Map a page of at least `size` bytes near `hint` (may be NULL).
///
/// The process exits if the OS cannot provide executable memory. Returns
/// NULL only when `size` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn vasm_page_new(size: usize, hint: *const c_void) -> *mut VasmCodePage {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let hint = (!hint.is_null()).then_some(hint.cast::<u8>());
    CodePage::new(size, hint).into_raw() as *mut VasmCodePage
}

/// Add a reference. Returns `page` for convenience.
///
/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_grab(page: *mut VasmCodePage) -> *mut VasmCodePage {
    if !page.is_null() {
        CodePage::grab_raw(page as *const c_void);
    }
    page
}

/// Release a reference; the last one unmaps the page.
///
/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`. The caller's
/// reference is consumed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_drop(page: *mut VasmCodePage) {
    if !page.is_null() {
        CodePage::drop_raw(page as *const c_void);
    }
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_finalize(page: *mut VasmCodePage) -> VasmResult {
    match page_ref(page) {
        Some(page) => page.finalize().into(),
        None => VasmResult::ErrNull,
    }
}

/// Append `len` bytes and store their offset in `out_offset` (may be NULL).
///
/// # Safety
/// `page` must be a live page pointer; `data` must be valid for `len`
/// bytes; `out_offset` must be NULL or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_append(
    page: *mut VasmCodePage,
    data: *const u8,
    len: usize,
    out_offset: *mut usize,
) -> VasmResult {
    let Some(page) = page_ref(page) else {
        return VasmResult::ErrNull;
    };
    if data.is_null() && len != 0 {
        return VasmResult::ErrNull;
    }
    let bytes = slice(data, len);
    match page.append(bytes) {
        Ok(offset) => {
            if !out_offset.is_null() {
                *out_offset = offset;
            }
            VasmResult::Ok
        }
        Err(e) => VasmResult::from(&e),
    }
}

/// Write `len` bytes at `offset`.
///
/// # Safety
/// As for [`vasm_page_append`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_write(
    page: *mut VasmCodePage,
    offset: usize,
    data: *const u8,
    len: usize,
) -> VasmResult {
    let Some(page) = page_ref(page) else {
        return VasmResult::ErrNull;
    };
    if data.is_null() && len != 0 {
        return VasmResult::ErrNull;
    }
    page.writer().write_at(offset, slice(data, len)).into()
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_base(page: *const VasmCodePage) -> *const c_void {
    page_ref(page).map_or(std::ptr::null(), |p| p.base().cast())
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_size(page: *const VasmCodePage) -> usize {
    page_ref(page).map_or(0, |p| p.size())
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_used(page: *const VasmCodePage) -> usize {
    page_ref(page).map_or(0, |p| p.used())
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_is_final(page: *const VasmCodePage) -> bool {
    page_ref(page).is_some_and(|p| p.is_final())
}

/// # Safety
/// `page` must be NULL or a live pointer from `vasm_page_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vasm_page_references(page: *const VasmCodePage) -> usize {
    page_ref(page).map_or(0, |p| p.references())
}

#[unsafe(no_mangle)]
pub extern "C" fn vasm_minimum_page_size() -> usize {
    CodePage::minimum_page_size()
}

unsafe fn page_ref(page: *const VasmCodePage) -> Option<std::mem::ManuallyDrop<CodePage>> {
    (!page.is_null()).then(|| CodePage::borrow_raw(page as *const c_void))
}

unsafe fn slice<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    }
}
