//! Packing several compiled functions into shared code pages.
//!
//! Mapping a page is a system call; most translated blocks are a few dozen
//! bytes. The arena keeps one open page and appends into it until the next
//! function does not fit, at which point the page is finalized and a new one
//! is opened. Every [`CodeSlice`] holds its own reference to the page it
//! lives in, so retired pages stay mapped while any slice is alive.

use std::sync::Mutex;

use tracing::debug;

use super::error::JitError;
use super::memory::CodePage;
use crate::config::JitConfig;

/// A run of code inside a [`CodePage`].
#[derive(Debug, Clone)]
pub struct CodeSlice {
    page: CodePage,
    offset: usize,
    len: usize,
}

impl CodeSlice {
    pub fn page(&self) -> &CodePage {
        &self.page
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the containing page has been finalized.
    pub fn is_executable(&self) -> bool {
        self.page.is_final()
    }

    pub fn bytes(&self) -> Result<Vec<u8>, JitError> {
        self.page.read(self.offset, self.len)
    }

    /// Function pointer to the start of the slice.
    ///
    /// # Safety
    /// See [`CodePage::entry`].
    pub unsafe fn entry<F: Copy>(&self) -> Option<F> {
        unsafe { self.page.entry(self.offset) }
    }
}

struct ArenaState {
    current: Option<CodePage>,
    pages_opened: usize,
}

/// Allocates code into shared pages of a configured size.
pub struct CodeArena {
    page_size: usize,
    hint: Option<usize>,
    state: Mutex<ArenaState>,
}

impl CodeArena {
    pub fn new(config: &JitConfig) -> Self {
        Self {
            page_size: config.page_size,
            hint: config.placement_hint,
            state: Mutex::new(ArenaState {
                current: None,
                pages_opened: 0,
            }),
        }
    }

    /// Copy `code` into the arena.
    ///
    /// The slice is not executable until its page is finalized, either by
    /// [`seal`](Self::seal) or by a later install that overflows the page.
    pub fn install(&self, code: &[u8]) -> Result<CodeSlice, JitError> {
        if code.is_empty() {
            return Err(JitError::InvalidSize(0));
        }
        let mut state = self.lock();

        let reusable = state
            .current
            .as_ref()
            .filter(|page| page.remaining() >= code.len())
            .map(CodePage::grab);
        let page = match reusable {
            Some(page) => page,
            None => {
                if let Some(full) = state.current.take() {
                    full.finalize()?;
                }
                let size = self.page_size.max(code.len());
                let page = CodePage::try_new(size, self.hint.map(|addr| addr as *const u8))?;
                state.pages_opened += 1;
                debug!(size = page.size(), pages = state.pages_opened, "arena opened code page");
                state.current = Some(page.grab());
                page
            }
        };
        let offset = page.append(code)?;
        Ok(CodeSlice {
            page,
            offset,
            len: code.len(),
        })
    }

    /// Finalize the open page so everything installed so far can run. The
    /// next install starts a fresh page.
    pub fn seal(&self) -> Result<(), JitError> {
        let mut state = self.lock();
        if let Some(page) = state.current.take() {
            page.finalize()?;
        }
        Ok(())
    }

    /// Number of pages this arena has mapped.
    pub fn page_count(&self) -> usize {
        self.lock().pages_opened
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArenaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
