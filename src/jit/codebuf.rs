//! Staging buffer for machine code.
//!
//! Emitters build a function here, then copy it into a [`CodePage`] with a
//! single guarded write.

use super::error::JitError;
use super::memory::CodePage;

/// A growable buffer of raw instruction bytes.
#[derive(Debug, Default, Clone)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a 16-bit value (little-endian).
    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit value (little-endian).
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit value (little-endian).
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Pad with `fill` up to the next multiple of `alignment` (a power of two).
    pub fn align(&mut self, alignment: usize, fill: u8) {
        debug_assert!(alignment.is_power_of_two());
        let current = self.code.len();
        let aligned = (current + alignment - 1) & !(alignment - 1);
        self.code.resize(aligned, fill);
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Append the buffer to `page` and return the offset it landed at.
    pub fn commit(&self, page: &CodePage) -> Result<usize, JitError> {
        page.append(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_bytes() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0x90);
        buf.emit_u16(0x1234);
        buf.emit_u32(0xDEADBEEF);

        assert_eq!(buf.len(), 7);
        assert_eq!(buf.code(), &[0x90, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_alignment() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xC3);
        buf.align(4, 0xCC);
        assert_eq!(buf.code(), &[0xC3, 0xCC, 0xCC, 0xCC]);

        buf.align(4, 0xCC);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_commit_packs_sequentially() {
        let page = CodePage::new(64, None);
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&[1, 2, 3]);
        assert_eq!(buf.commit(&page).unwrap(), 0);
        assert_eq!(buf.commit(&page).unwrap(), 3);
        assert_eq!(page.read(0, 6).unwrap(), vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_commit_after_finalize_fails() {
        let page = CodePage::new(64, None);
        page.finalize().unwrap();
        let mut buf = CodeBuffer::new();
        buf.emit_u64(0);
        assert!(matches!(buf.commit(&page), Err(JitError::PageFinalized)));
    }
}
