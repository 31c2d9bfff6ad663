//! vasm - JIT assembler backend
//!
//! Executable code pages, calling-convention register tables and emission
//! locking for a native code generator. For C/C++ emitters, use the FFI
//! module functions.

pub mod config;
pub mod ffi;
pub mod jit;
pub mod logging;

// Re-export commonly used types
pub use config::JitConfig;
pub use jit::{CodeArena, CodePage, CriticalSection, HostProcessor, JitError, Processor, Register};
