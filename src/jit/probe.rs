//! Host probe thunk: `extern "C" fn(i64, i64) -> i64` returning the sum.
//!
//! Used to check the full map / write / finalize / call path on the
//! running machine. Argument and return registers come from the
//! capability table, not from hard-coded names.

use super::abi::HostProcessor;
use super::codebuf::CodeBuffer;
use super::error::JitError;
use super::memory::CodePage;
use super::register::Register;

/// Signature of the add thunk.
pub type AddThunk = extern "C" fn(i64, i64) -> i64;

#[cfg(target_arch = "x86_64")]
pub fn emit_add_thunk(cpu: &HostProcessor, buf: &mut CodeBuffer) -> Result<(), JitError> {
    use super::x86_64::{ProbeAssembler, Reg};

    let lhs = encodable(Reg::from_descriptor, cpu.int_arg(0)?)?;
    let rhs = encodable(Reg::from_descriptor, cpu.int_arg(1)?)?;
    let ret = encodable(Reg::from_descriptor, cpu.int_return())?;

    let mut asm = ProbeAssembler::new(buf);
    asm.mov_rr(ret, lhs);
    asm.add_rr(ret, rhs);
    asm.ret();

    Ok(())
}

#[cfg(target_arch = "aarch64")]
pub fn emit_add_thunk(cpu: &HostProcessor, buf: &mut CodeBuffer) -> Result<(), JitError> {
    use super::aarch64::{ProbeAssembler, Reg};

    let lhs = encodable(Reg::from_descriptor, cpu.int_arg(0)?)?;
    let rhs = encodable(Reg::from_descriptor, cpu.int_arg(1)?)?;
    let ret = encodable(Reg::from_descriptor, cpu.int_return())?;

    let mut asm = ProbeAssembler::new(buf);
    asm.add(ret, lhs, rhs);
    asm.ret();

    Ok(())
}

fn encodable<R>(convert: fn(Register) -> Option<R>, reg: Register) -> Result<R, JitError> {
    convert(reg).ok_or(JitError::UnknownRegister {
        isa: reg.isa(),
        class: reg.class(),
        code: reg.code(),
    })
}

/// Build the add thunk into `page` and return its offset. The page still
/// has to be finalized before the thunk can run.
pub fn install_add_thunk(cpu: &HostProcessor, page: &CodePage) -> Result<usize, JitError> {
    let mut buf = CodeBuffer::with_capacity(16);
    emit_add_thunk(cpu, &mut buf)?;
    buf.commit(page)
}
