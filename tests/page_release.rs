//! Unmapping on last release, observed through the kernel.
//!
//! Kept as the only test in its binary so no other test can map memory
//! into the hole between the release and the check.

#![cfg(target_os = "linux")]

use vasm::jit::CodePage;

fn is_mapped(addr: *const u8, len: usize) -> bool {
    let pages = len.div_ceil(CodePage::minimum_page_size());
    let mut residency = vec![0u8; pages];
    let rc = unsafe { libc::mincore(addr as *mut libc::c_void, len, residency.as_mut_ptr()) };
    if rc == 0 {
        return true;
    }
    assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::ENOMEM));
    false
}

#[test]
fn test_last_drop_unmaps() {
    let page = CodePage::new(CodePage::minimum_page_size() * 3, None);
    let base = page.base();
    let size = page.size();
    assert!(is_mapped(base, size));

    let other = page.grab();
    assert_eq!(page.references(), 2);
    page.release();
    assert_eq!(other.references(), 1);
    assert!(is_mapped(base, size));

    other.release();
    assert!(!is_mapped(base, size));
}
