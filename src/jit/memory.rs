//! Executable code pages.
//!
//! A [`CodePage`] is a shared handle to one OS mapping. Emitters append
//! machine code through a [`PageWriter`], then [`CodePage::finalize`] flips
//! the mapping to read+execute and flushes the instruction cache.
//!
//! Protection policy per host:
//! - Linux and other unix: W^X. The mapping starts `RW-` and finalize
//!   `mprotect`s it to `R-X`.
//! - macOS: `RWX` + `MAP_JIT`. On Apple silicon, writability is a per-thread
//!   switch (`pthread_jit_write_protect_np`) covering every JIT page, so it
//!   is only lifted for the duration of each copy. Intel Macs `mprotect` in
//!   finalize.

use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, error, trace};

use super::error::JitError;
use super::sync::{CriticalSection, SectionGuard};

struct Mapping {
    base: NonNull<u8>,
    size: usize,
    used: AtomicUsize,
    finalized: AtomicBool,
    section: CriticalSection,
}

// SAFETY: the mapping is owned by this struct; writes to it only happen
// while `section` is held, and the bookkeeping fields are atomics.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Drop for Mapping {
    fn drop(&mut self) {
        debug!(base = ?self.base, size = self.size, "unmapping code page");
        unsafe { sys::unmap(self.base, self.size) };
    }
}

/// Shared handle to a block of executable memory.
///
/// Cloning (or [`grab`](CodePage::grab)) adds a reference; dropping (or
/// [`release`](CodePage::release)) removes one. The mapping is returned to
/// the OS when the last handle goes away.
#[derive(Clone)]
pub struct CodePage {
    inner: Arc<Mapping>,
}

impl CodePage {
    /// Map a new page, terminating the process if the OS refuses.
    ///
    /// There is no sane way to keep compiling without executable memory, so
    /// a mapping failure is logged and the process exits with status 1.
    ///
    /// # Panics
    /// If `size` is zero.
    pub fn new(size: usize, hint: Option<*const u8>) -> CodePage {
        match Self::try_new(size, hint) {
            Ok(page) => page,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "cannot obtain executable memory");
                std::process::exit(1);
            }
            Err(e) => panic!("{}", e),
        }
    }

    /// Map a new page of at least `size` bytes.
    ///
    /// `size` is rounded up to whole pages. `hint` is aligned down to a page
    /// boundary and passed to the OS as a placement preference only; the
    /// kernel is free to put the mapping elsewhere.
    pub fn try_new(size: usize, hint: Option<*const u8>) -> Result<CodePage, JitError> {
        let page_size = Self::minimum_page_size();
        if size == 0 {
            return Err(JitError::InvalidSize(size));
        }
        let aligned_size = size
            .div_ceil(page_size)
            .checked_mul(page_size)
            .ok_or(JitError::InvalidSize(size))?;

        let hint = hint
            .map(|p| p as usize)
            .map(|addr| addr - addr % page_size)
            .unwrap_or(0);

        let base = sys::map(aligned_size, hint)?;
        sys::invalidate_icache(base, aligned_size);

        debug!(?base, size = aligned_size, requested = size, "mapped code page");

        Ok(CodePage {
            inner: Arc::new(Mapping {
                base,
                size: aligned_size,
                used: AtomicUsize::new(0),
                finalized: AtomicBool::new(false),
                section: CriticalSection::new(),
            }),
        })
    }

    /// Host page granularity in bytes.
    pub fn minimum_page_size() -> usize {
        sys::page_size()
    }

    /// Another handle to the same page.
    pub fn grab(&self) -> CodePage {
        self.clone()
    }

    /// Give up this handle. Same as dropping it.
    pub fn release(self) {}

    /// Number of live handles.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Mapped size in bytes (a multiple of the page size).
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn base(&self) -> *const u8 {
        self.inner.base.as_ptr()
    }

    /// Bytes claimed by emitted code so far.
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.size() - self.used()
    }

    pub fn is_final(&self) -> bool {
        self.inner.finalized.load(Ordering::Acquire)
    }

    /// Enter the page's critical section for writing.
    ///
    /// Blocks while another thread writes or finalizes. Calling this again
    /// on the same thread before dropping the writer panics.
    pub fn writer(&self) -> PageWriter<'_> {
        let guard = self.inner.section.enter();
        PageWriter {
            page: &self.inner,
            _guard: guard,
        }
    }

    /// Append `bytes` in one guarded write and return their offset.
    pub fn append(&self, bytes: &[u8]) -> Result<usize, JitError> {
        self.writer().append(bytes)
    }

    /// Make the page executable.
    ///
    /// Waits for any writer, revokes write access, grants execute and
    /// invalidates the instruction cache over the whole page. There is no
    /// "already final" short cut: every call repeats the OS calls, which is
    /// harmless and leaves the contents untouched.
    pub fn finalize(&self) -> Result<(), JitError> {
        let inner = &self.inner;
        let _guard = inner.section.enter();
        sys::make_executable(inner.base, inner.size)?;
        sys::invalidate_icache(inner.base, inner.size);
        inner.finalized.store(true, Ordering::Release);
        debug!(base = ?inner.base, size = inner.size, used = self.used(), "finalized code page");
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` out of the page.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, JitError> {
        let inner = &self.inner;
        check_bounds(offset, len, inner.size)?;
        let _guard = inner.section.enter();
        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(inner.base.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Function pointer to code at `offset`.
    ///
    /// Returns `None` until the page is finalized, when `offset` is past the
    /// emitted code, or when `F` is not pointer sized.
    ///
    /// # Safety
    /// The bytes at `offset` must be a valid function for the host ISA with
    /// the signature `F`, and the page must outlive every call through it.
    pub unsafe fn entry<F: Copy>(&self, offset: usize) -> Option<F> {
        if !self.is_final() || offset >= self.used() {
            return None;
        }
        if std::mem::size_of::<F>() != std::mem::size_of::<fn()>() {
            return None;
        }
        let ptr = unsafe { self.inner.base.as_ptr().add(offset) };
        // SAFETY: caller guarantees `F` matches the code at `ptr`.
        Some(unsafe { std::mem::transmute_copy(&ptr) })
    }

    /// Leak this handle as an opaque pointer for the C ABI.
    pub(crate) fn into_raw(self) -> *const std::ffi::c_void {
        Arc::into_raw(self.inner).cast()
    }

    /// Borrow the page behind a pointer from [`into_raw`](Self::into_raw)
    /// without consuming its reference.
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and still hold a reference.
    pub(crate) unsafe fn borrow_raw(ptr: *const std::ffi::c_void) -> ManuallyDrop<CodePage> {
        ManuallyDrop::new(CodePage {
            inner: unsafe { Arc::from_raw(ptr.cast::<Mapping>()) },
        })
    }

    /// # Safety
    /// As for [`borrow_raw`](Self::borrow_raw).
    pub(crate) unsafe fn grab_raw(ptr: *const std::ffi::c_void) {
        unsafe { Arc::increment_strong_count(ptr.cast::<Mapping>()) }
    }

    /// # Safety
    /// As for [`borrow_raw`](Self::borrow_raw); the pointer's reference is
    /// consumed.
    pub(crate) unsafe fn drop_raw(ptr: *const std::ffi::c_void) {
        unsafe { Arc::decrement_strong_count(ptr.cast::<Mapping>()) }
    }
}

impl std::fmt::Debug for CodePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodePage")
            .field("base", &self.inner.base)
            .field("size", &self.size())
            .field("used", &self.used())
            .field("final", &self.is_final())
            .field("references", &self.references())
            .finish()
    }
}

fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), JitError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(JitError::OutOfBounds { offset, len, size }),
    }
}

/// Exclusive write access to a page, held for the writer's lifetime.
pub struct PageWriter<'a> {
    page: &'a Mapping,
    _guard: SectionGuard<'a>,
}

impl PageWriter<'_> {
    /// Copy `bytes` to `offset`. Extends the used region if the write ends
    /// past it.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), JitError> {
        let page = self.page;
        if page.finalized.load(Ordering::Acquire) {
            return Err(JitError::PageFinalized);
        }
        check_bounds(offset, bytes.len(), page.size)?;

        unsafe { sys::copy_code(page.base.as_ptr().add(offset), bytes) };
        page.used.fetch_max(offset + bytes.len(), Ordering::AcqRel);
        trace!(base = ?page.base, offset, len = bytes.len(), "wrote code bytes");
        Ok(())
    }

    /// Write `bytes` at the end of the used region; returns their offset.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, JitError> {
        let offset = self.used();
        self.write_at(offset, bytes)?;
        Ok(offset)
    }

    pub fn used(&self) -> usize {
        self.page.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.page.size - self.used()
    }
}

#[cfg(not(unix))]
compile_error!("vasm code pages require a unix host (mmap/mprotect)");

mod sys {
    use std::io;
    use std::ptr::NonNull;

    use super::JitError;

    pub(super) fn page_size() -> usize {
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 { n as usize } else { 4096 }
    }

    pub(super) fn map(size: usize, hint: usize) -> Result<NonNull<u8>, JitError> {
        #[cfg(target_os = "macos")]
        let (prot, flags) = (
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_JIT,
        );
        #[cfg(not(target_os = "macos"))]
        let (prot, flags) = (
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        );

        let ptr = unsafe { libc::mmap(hint as *mut libc::c_void, size, prot, flags, -1, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::MapFailed {
                size,
                source: io::Error::last_os_error(),
            });
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| JitError::MapFailed {
            size,
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        })
    }

    /// # Safety
    /// `base`/`size` must describe a live mapping from [`map`].
    pub(super) unsafe fn unmap(base: NonNull<u8>, size: usize) {
        unsafe {
            libc::munmap(base.as_ptr().cast(), size);
        }
    }

    /// Copy `code` to `dst` inside a mapping from [`map`].
    ///
    /// On Apple silicon the thread's JIT write switch is lifted for the copy
    /// alone and restored before returning, so writers on other pages and
    /// already finalized code on this thread never see it flipped.
    ///
    /// # Safety
    /// `dst..dst + code.len()` must lie inside a live, unfinalized mapping.
    pub(super) unsafe fn copy_code(dst: *mut u8, code: &[u8]) {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        unsafe {
            pthread_jit_write_protect_np(0);
            std::ptr::copy_nonoverlapping(code.as_ptr(), dst, code.len());
            pthread_jit_write_protect_np(1);
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), dst, code.len());
        }
    }

    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    pub(super) fn make_executable(_base: NonNull<u8>, _size: usize) -> Result<(), JitError> {
        // MAP_JIT pages are RWX; the write switch is already back on outside
        // `copy_code`.
        Ok(())
    }

    #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
    pub(super) fn make_executable(base: NonNull<u8>, size: usize) -> Result<(), JitError> {
        let rc = unsafe {
            libc::mprotect(base.as_ptr().cast(), size, libc::PROT_READ | libc::PROT_EXEC)
        };
        if rc != 0 {
            return Err(JitError::ProtectFailed(io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    pub(super) fn invalidate_icache(base: NonNull<u8>, size: usize) {
        unsafe { sys_icache_invalidate(base.as_ptr().cast(), size) };
    }

    #[cfg(all(not(target_os = "macos"), target_arch = "aarch64"))]
    pub(super) fn invalidate_icache(base: NonNull<u8>, size: usize) {
        let start = base.as_ptr();
        unsafe { __clear_cache(start.cast(), start.add(size).cast()) };
    }

    #[cfg(all(not(target_os = "macos"), target_arch = "x86_64"))]
    pub(super) fn invalidate_icache(_base: NonNull<u8>, _size: usize) {
        // x86 keeps instruction fetch coherent with stores; only keep the
        // compiler from sinking the code writes past this point.
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(target_os = "macos")]
    unsafe extern "C" {
        fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
    }

    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    unsafe extern "C" {
        fn pthread_jit_write_protect_np(enabled: libc::c_int);
    }

    #[cfg(all(not(target_os = "macos"), target_arch = "aarch64"))]
    unsafe extern "C" {
        fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::error::ErrorKind;
    use std::thread;

    #[test]
    fn test_rounds_up_to_pages() {
        let ps = CodePage::minimum_page_size();
        let page = CodePage::try_new(ps + 1, None).unwrap();
        assert_eq!(page.size(), 2 * ps);
        assert_eq!(page.used(), 0);
        assert!(!page.is_final());

        // The second page is really there.
        page.writer().write_at(ps, &[0xAB; 4]).unwrap();
        assert_eq!(page.read(ps, 4).unwrap(), vec![0xAB; 4]);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(CodePage::try_new(0, None), Err(JitError::InvalidSize(0))));
    }

    #[test]
    #[should_panic(expected = "invalid code page size")]
    fn test_new_panics_on_zero_size() {
        let _ = CodePage::new(0, None);
    }

    #[test]
    fn test_unaligned_hint_aligned_down() {
        let ps = CodePage::minimum_page_size();
        let freed = {
            let scratch = CodePage::try_new(4 * ps, None).unwrap();
            scratch.base() as usize
        };

        let hint = (freed + ps + 123) as *const u8;
        let page = CodePage::try_new(64, Some(hint)).unwrap();
        assert_eq!(page.base() as usize, freed + ps);
    }

    #[test]
    fn test_map_failure_is_fatal() {
        let err = CodePage::try_new(1 << 62, None).unwrap_err();
        assert!(matches!(err, JitError::MapFailed { size, .. } if size == 1 << 62));
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_append_advances_used() {
        let page = CodePage::new(64, None);
        let mut w = page.writer();
        assert_eq!(w.append(&[1, 2, 3]).unwrap(), 0);
        assert_eq!(w.append(&[4, 5]).unwrap(), 3);
        assert_eq!(w.used(), 5);
        drop(w);
        assert_eq!(page.read(0, 5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(page.remaining(), page.size() - 5);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let page = CodePage::new(1, None);
        let size = page.size();
        let err = page.writer().write_at(size - 1, &[0, 0]).unwrap_err();
        assert!(matches!(err, JitError::OutOfBounds { len: 2, .. }));
        assert!(page.writer().write_at(usize::MAX, &[0]).is_err());
        assert_eq!(page.used(), 0);
    }

    #[test]
    fn test_write_after_finalize_rejected() {
        let page = CodePage::new(64, None);
        page.append(&[0x90]).unwrap();
        page.finalize().unwrap();

        assert!(matches!(page.append(&[0x90]), Err(JitError::PageFinalized)));
        assert!(matches!(
            page.writer().write_at(8, &[0x90]),
            Err(JitError::PageFinalized)
        ));
        assert_eq!(page.used(), 1);
    }

    #[test]
    fn test_double_finalize_keeps_content() {
        let page = CodePage::new(128, None);
        let pattern: Vec<u8> = (0..100).collect();
        page.append(&pattern).unwrap();

        page.finalize().unwrap();
        let first = page.read(0, 100).unwrap();
        page.finalize().unwrap();
        let second = page.read(0, 100).unwrap();

        assert!(page.is_final());
        assert_eq!(first, pattern);
        assert_eq!(second, pattern);
    }

    #[test]
    fn test_reference_counting() {
        let page = CodePage::new(64, None);
        assert_eq!(page.references(), 1);

        let second = page.grab();
        assert_eq!(page.references(), 2);
        let third = second.grab();
        assert_eq!(page.references(), 3);
        assert_eq!(third.base(), page.base());

        second.release();
        assert_eq!(page.references(), 2);
        drop(third);
        assert_eq!(page.references(), 1);

        let weak = Arc::downgrade(&page.inner);
        page.release();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_entry_requires_finalize() {
        let page = CodePage::new(64, None);
        page.append(&[0xC3]).unwrap();
        unsafe {
            assert!(page.entry::<extern "C" fn()>(0).is_none());
        }
        page.finalize().unwrap();
        unsafe {
            assert!(page.entry::<extern "C" fn()>(0).is_some());
            assert!(page.entry::<extern "C" fn()>(1).is_none());
            assert!(page.entry::<u8>(0).is_none());
        }
    }

    #[test]
    fn test_concurrent_disjoint_writes() {
        const THREADS: usize = 8;
        const CHUNK: usize = 96;

        let page = CodePage::new(THREADS * CHUNK, None);
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let page = page.grab();
                thread::spawn(move || {
                    let pattern = vec![0xA0 ^ i as u8; CHUNK];
                    page.writer().write_at(i * CHUNK, &pattern).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(page.references(), 1);
        page.finalize().unwrap();
        for i in 0..THREADS {
            let bytes = page.read(i * CHUNK, CHUNK).unwrap();
            assert!(bytes.iter().all(|&b| b == 0xA0 ^ i as u8), "chunk {} corrupted", i);
        }
        assert_eq!(page.used(), THREADS * CHUNK);
    }

    #[test]
    fn test_nested_writers_on_two_pages() {
        let outer_page = CodePage::new(64, None);
        let inner_page = CodePage::new(64, None);

        let mut outer = outer_page.writer();
        outer.append(&[0x01]).unwrap();
        {
            let mut inner = inner_page.writer();
            inner.append(&[0x02]).unwrap();
        }
        inner_page.append(&[0x03]).unwrap();
        inner_page.finalize().unwrap();
        outer.append(&[0x04]).unwrap();
        drop(outer);

        assert_eq!(outer_page.read(0, 2).unwrap(), vec![0x01, 0x04]);
        assert_eq!(inner_page.read(0, 2).unwrap(), vec![0x02, 0x03]);
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn test_finalize_while_writing_panics() {
        let page = CodePage::new(64, None);
        let _w = page.writer();
        let _ = page.finalize();
    }
}
