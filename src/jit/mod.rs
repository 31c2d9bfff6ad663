//! JIT backend substrate.
//!
//! This module provides what sits beneath an instruction encoder:
//! - Register descriptors and per-ISA calling-convention tables
//! - Executable code pages with W^X-aware finalize
//! - A non-reentrant critical section for concurrent emission
//! - A code buffer, a page-packing arena and a host probe thunk

pub mod aarch64;
pub mod abi;
pub mod arena;
pub mod codebuf;
pub mod error;
pub mod memory;
pub mod probe;
pub mod register;
pub mod sync;
pub mod x86_64;

pub use abi::{AbiReport, CallingConvention, HostConvention, HostProcessor, Processor};
pub use arena::{CodeArena, CodeSlice};
pub use codebuf::CodeBuffer;
pub use error::{ErrorKind, JitError};
pub use memory::{CodePage, PageWriter};
pub use register::{Isa, RegClass, Register};
pub use sync::{CriticalSection, SectionGuard};
