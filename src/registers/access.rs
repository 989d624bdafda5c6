use nix::errno::Errno;

use crate::error::{Error, Result, ResultExt};
use crate::tracer::{Pid, PtraceRequest};
use crate::x86::DebugRegister;

/// Bulk register transfer between a stopped thread and a caller-owned snapshot buffer.
///
/// Buffers are sized to the kernel's register structures, see [`RegisterLayout`].
///
/// [`RegisterLayout`]: super::RegisterLayout
pub trait RegisterAccess {
    fn read_gpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()>;

    fn write_gpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()>;

    fn read_fpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()>;

    fn write_fpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()>;

    fn read_debug_register(&mut self, _tid: Pid, _dr: DebugRegister) -> Result<u64> {
        Err(Error::Unsupported("debug registers"))
    }

    fn write_debug_register(&mut self, _tid: Pid, _dr: DebugRegister, _value: u64) -> Result<()> {
        Err(Error::Unsupported("debug registers"))
    }
}

/// Register access through `ptrace(2)` requests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PtraceRegisters;

fn check_size(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch { expected, actual })
    }
}

#[cfg(target_arch = "x86_64")]
impl PtraceRegisters {
    fn transfer(request: PtraceRequest, tid: Pid, expected: usize, buf: *mut libc::c_void, len: usize) -> Result<()> {
        check_size(expected, len)?;

        // SAFETY: `buf` points to `len` bytes, and `len` matches the size of the kernel
        // structure copied for `request`.
        let res = unsafe {
            libc::ptrace(request, tid.as_raw(), std::ptr::null_mut::<libc::c_void>(), buf)
        };

        Errno::result(res).map(drop).died_if_esrch(tid)
    }
}

#[cfg(target_arch = "x86_64")]
impl RegisterAccess for PtraceRegisters {
    fn read_gpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        let size = std::mem::size_of::<libc::user_regs_struct>();
        Self::transfer(libc::PTRACE_GETREGS, tid, size, buf.as_mut_ptr().cast(), buf.len())
    }

    fn write_gpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        // The kernel only reads from `buf` for `PTRACE_SETREGS`.
        let size = std::mem::size_of::<libc::user_regs_struct>();
        Self::transfer(libc::PTRACE_SETREGS, tid, size, buf.as_ptr() as *mut _, buf.len())
    }

    fn read_fpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        let size = std::mem::size_of::<libc::user_fpregs_struct>();
        Self::transfer(libc::PTRACE_GETFPREGS, tid, size, buf.as_mut_ptr().cast(), buf.len())
    }

    fn write_fpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        let size = std::mem::size_of::<libc::user_fpregs_struct>();
        Self::transfer(libc::PTRACE_SETFPREGS, tid, size, buf.as_ptr() as *mut _, buf.len())
    }

    fn read_debug_register(&mut self, tid: Pid, dr: DebugRegister) -> Result<u64> {
        peek_user(tid, dr.user_offset())
    }

    fn write_debug_register(&mut self, tid: Pid, dr: DebugRegister, value: u64) -> Result<()> {
        poke_user(tid, dr.user_offset(), value)
    }
}

#[cfg(target_arch = "aarch64")]
impl PtraceRegisters {
    fn regset(request: PtraceRequest, tid: Pid, note: i32, expected: usize, buf: *mut libc::c_void, len: usize) -> Result<()> {
        check_size(expected, len)?;

        let mut iov = libc::iovec { iov_base: buf, iov_len: len };

        // SAFETY: `iov` describes a live buffer of `len` bytes, the size of the regset.
        let res = unsafe {
            libc::ptrace(request, tid.as_raw(), note as usize as *mut libc::c_void, &mut iov as *mut libc::iovec)
        };

        Errno::result(res).map(drop).died_if_esrch(tid)
    }
}

#[cfg(target_arch = "aarch64")]
impl RegisterAccess for PtraceRegisters {
    fn read_gpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        use crate::aarch64::{user_pt_regs, NT_PRSTATUS};

        let size = std::mem::size_of::<user_pt_regs>();
        Self::regset(libc::PTRACE_GETREGSET, tid, NT_PRSTATUS, size, buf.as_mut_ptr().cast(), buf.len())
    }

    fn write_gpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        use crate::aarch64::{user_pt_regs, NT_PRSTATUS};

        let size = std::mem::size_of::<user_pt_regs>();
        Self::regset(libc::PTRACE_SETREGSET, tid, NT_PRSTATUS, size, buf.as_ptr() as *mut _, buf.len())
    }

    fn read_fpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        use crate::aarch64::{user_fpsimd_state, NT_PRFPREG};

        let size = std::mem::size_of::<user_fpsimd_state>();
        Self::regset(libc::PTRACE_GETREGSET, tid, NT_PRFPREG, size, buf.as_mut_ptr().cast(), buf.len())
    }

    fn write_fpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        use crate::aarch64::{user_fpsimd_state, NT_PRFPREG};

        let size = std::mem::size_of::<user_fpsimd_state>();
        Self::regset(libc::PTRACE_SETREGSET, tid, NT_PRFPREG, size, buf.as_ptr() as *mut _, buf.len())
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn peek_user(tid: Pid, off: u64) -> Result<u64> {
    // SAFETY: `off` does not require validation, because it is not actually used as a
    // pointer offset by the kernel.
    //
    // See: https://github.com/torvalds/linux/blob/v4.9/arch/x86/kernel/ptrace.c#L774-L791

    // `-1` is a valid word, so errors are only visible through `errno`.
    Errno::clear();

    let data = unsafe {
        libc::ptrace(
            libc::PTRACE_PEEKUSER,
            tid.as_raw(),
            off as usize as *mut libc::c_void,
            std::ptr::null_mut::<libc::c_void>(),
        )
    };

    if data == -1 {
        let errno = Errno::last();
        if errno != Errno::UnknownErrno {
            return Err::<u64, _>(errno).died_if_esrch(tid);
        }
    }

    Ok(data as u64)
}

#[cfg(target_arch = "x86_64")]
fn poke_user(tid: Pid, off: u64, data: u64) -> Result<()> {
    // SAFETY: see `peek_user()`.
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEUSER,
            tid.as_raw(),
            off as usize as *mut libc::c_void,
            data as usize as *mut libc::c_void,
        )
    };

    Errno::result(res).map(drop).died_if_esrch(tid)
}
