//! C FFI for JIT emitters written in C or C++.
//!
//! This module exposes the register tables, code pages and critical
//! sections with `extern "C"` linkage. `build.rs` turns it into
//! `include/vasm.h` via cbindgen.
//!
//! # Safety
//!
//! All FFI functions that take raw pointers require:
//! - Pointers produced by the matching `vasm_*_new` function (or NULL where
//!   documented)
//! - One `vasm_page_drop` per page reference the caller owns
//! - No use of a page or section after its last release

mod page;
mod processor;
mod section;
mod types;

#[allow(unused_imports)]
pub use page::*;
#[allow(unused_imports)]
pub use processor::*;
#[allow(unused_imports)]
pub use section::*;
#[allow(unused_imports)]
pub use types::*;

/// Version information
pub const VASM_VERSION_MAJOR: u32 = 0;
pub const VASM_VERSION_MINOR: u32 = 1;
pub const VASM_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn vasm_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = unsafe { std::ffi::CStr::from_ptr(vasm_version()).to_str().unwrap() };
        assert_eq!(version, format!("{}.{}.{}", VASM_VERSION_MAJOR, VASM_VERSION_MINOR, VASM_VERSION_PATCH));
    }
}
