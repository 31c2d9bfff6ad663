//! Mutual exclusion for code emission.
//!
//! `CriticalSection` wraps one `pthread_mutex_t`. It is configured as an
//! error-checking mutex so that re-entering from the owning thread fails
//! loudly instead of deadlocking.

use std::cell::UnsafeCell;
use std::io;
use std::marker::PhantomData;

/// A non-reentrant platform mutex guarding code emission.
pub struct CriticalSection {
    // Boxed: a pthread mutex must not move once initialised.
    lock: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: pthread mutexes are designed to be shared between threads; all
// access goes through the pthread API.
unsafe impl Send for CriticalSection {}
unsafe impl Sync for CriticalSection {}

impl CriticalSection {
    pub fn new() -> Self {
        let lock = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let rc = unsafe {
            let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
            libc::pthread_mutexattr_init(&mut attr);
            libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_ERRORCHECK);
            let rc = libc::pthread_mutex_init(lock.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            rc
        };
        assert!(
            rc == 0,
            "pthread_mutex_init failed: {}",
            io::Error::from_raw_os_error(rc)
        );
        Self { lock }
    }

    /// Block until the calling thread owns the section.
    ///
    /// # Panics
    /// If the calling thread already owns it.
    pub fn enter(&self) -> SectionGuard<'_> {
        match self.lock_raw() {
            0 => SectionGuard::new(self),
            libc::EDEADLK => panic!("critical section re-entered by its owning thread"),
            rc => panic!(
                "pthread_mutex_lock failed: {}",
                io::Error::from_raw_os_error(rc)
            ),
        }
    }

    /// Take the section if nobody holds it.
    pub fn try_enter(&self) -> Option<SectionGuard<'_>> {
        let rc = unsafe { libc::pthread_mutex_trylock(self.lock.get()) };
        (rc == 0).then(|| SectionGuard::new(self))
    }

    /// Run `f` while holding the section.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Lock without producing a guard. Returns the pthread status code.
    pub(crate) fn lock_raw(&self) -> i32 {
        unsafe { libc::pthread_mutex_lock(self.lock.get()) }
    }

    /// Unlock without a guard. `EPERM` means the caller does not own it.
    pub(crate) fn unlock_raw(&self) -> i32 {
        unsafe { libc::pthread_mutex_unlock(self.lock.get()) }
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.lock.get());
        }
    }
}

impl std::fmt::Debug for CriticalSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalSection").finish_non_exhaustive()
    }
}

/// Ownership of a [`CriticalSection`]. Dropping it leaves the section.
///
/// Not `Send`: it must be released by the thread that entered.
#[must_use = "the section is left as soon as the guard is dropped"]
pub struct SectionGuard<'a> {
    section: &'a CriticalSection,
    _not_send: PhantomData<*const ()>,
}

impl<'a> SectionGuard<'a> {
    fn new(section: &'a CriticalSection) -> Self {
        Self {
            section,
            _not_send: PhantomData,
        }
    }

    /// Leave the section explicitly.
    pub fn leave(self) {}
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        let rc = self.section.unlock_raw();
        debug_assert_eq!(rc, 0, "pthread_mutex_unlock failed");
    }
}
