//! Error types for the JIT backend.

use std::io;

use thiserror::Error;

use super::register::{Isa, RegClass};

/// Broad category of a [`JitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller broke a contract (bad index, write after finalize, ...).
    /// Retrying cannot help; the emitter has a bug.
    ContractViolation,
    /// The operating system refused to hand out or reprotect executable
    /// memory. There is no correct way to continue generating code.
    ResourceExhausted,
}

/// Errors produced by the register tables, code pages and arenas.
#[derive(Debug, Error)]
pub enum JitError {
    #[error("{class} argument index {index} out of bounds (max {max})")]
    ArgumentOutOfRange {
        class: RegClass,
        index: usize,
        max: usize,
    },

    #[error("no {class} register with code {code} on {isa}")]
    UnknownRegister { isa: Isa, class: RegClass, code: u8 },

    #[error("code page is finalized; writes are no longer permitted")]
    PageFinalized,

    #[error("write of {len} bytes at offset {offset} exceeds page size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("invalid code page size {0}")]
    InvalidSize(usize),

    #[error("mmap of {size} bytes failed: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("changing code page protection failed: {0}")]
    ProtectFailed(#[source] io::Error),
}

impl JitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JitError::MapFailed { .. } | JitError::ProtectFailed(_) => {
                ErrorKind::ResourceExhausted
            }
            _ => ErrorKind::ContractViolation,
        }
    }

    /// Whether the process should stop generating code altogether.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::ResourceExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err = JitError::ArgumentOutOfRange {
            class: RegClass::Int,
            index: 9,
            max: 6,
        };
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert!(!err.is_fatal());

        let err = JitError::MapFailed {
            size: 4096,
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = JitError::ArgumentOutOfRange {
            class: RegClass::Float,
            index: 8,
            max: 8,
        };
        assert_eq!(err.to_string(), "float argument index 8 out of bounds (max 8)");
    }
}
