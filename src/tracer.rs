//! Tracing primitives used to restart and release stopped threads.

use std::fmt;

use nix::errno::Errno;
use tracing::{debug, trace};

use crate::error::{Error, Result, ResultExt};

pub use nix::unistd::Pid;

/// POSIX signal.
pub use nix::sys::signal::Signal;

/// Request argument type of `libc::ptrace()`, which differs across C libraries.
#[cfg(target_env = "musl")]
pub(crate) type PtraceRequest = libc::c_int;

#[cfg(not(target_env = "musl"))]
pub(crate) type PtraceRequest = libc::c_uint;

/// Restart requests, which resume stopped threads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Restart {
    Continue,
    Step,
}

impl fmt::Display for Restart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restart::Continue => write!(f, "continue"),
            Restart::Step => write!(f, "single-step"),
        }
    }
}

/// Process tracing operations needed by threads and processes.
///
/// Signals are passed as raw numbers, since real-time signals have no [`Signal`] variant.
pub trait Tracer {
    /// Continue `tid`, delivering `signo` if present.
    fn resume(&mut self, tid: Pid, signo: Option<i32>) -> Result<()>;

    /// Single-step `tid`, delivering `signo` if present.
    fn single_step(&mut self, tid: Pid, signo: Option<i32>) -> Result<()>;

    fn detach(&mut self, pid: Pid) -> Result<()>;

    /// Base address of the thread-local storage block of `tid`.
    fn read_thread_pointer(&mut self, tid: Pid) -> Result<u64>;
}

/// [`Tracer`] implemented with `ptrace(2)`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PtraceTracer;

impl PtraceTracer {
    pub fn new() -> Self {
        Self
    }

    fn restart(&mut self, tid: Pid, mode: Restart, signo: Option<i32>) -> Result<()> {
        let request = match mode {
            Restart::Continue => libc::PTRACE_CONT,
            Restart::Step => libc::PTRACE_SINGLESTEP,
        };

        trace!(tid = tid.as_raw(), %mode, ?signo, "restarting thread");

        let data = signo.unwrap_or(0) as usize as *mut libc::c_void;

        // SAFETY: restart requests do not dereference `addr` or `data`.
        let res = unsafe { libc::ptrace(request, tid.as_raw(), std::ptr::null_mut::<libc::c_void>(), data) };

        Errno::result(res)
            .map(drop)
            .map_err(|source| Error::Restart { pid: tid, mode, source })
    }
}

impl Tracer for PtraceTracer {
    fn resume(&mut self, tid: Pid, signo: Option<i32>) -> Result<()> {
        self.restart(tid, Restart::Continue, signo)
    }

    fn single_step(&mut self, tid: Pid, signo: Option<i32>) -> Result<()> {
        self.restart(tid, Restart::Step, signo)
    }

    fn detach(&mut self, pid: Pid) -> Result<()> {
        debug!(pid = pid.as_raw(), "detaching");

        nix::sys::ptrace::detach(pid, None::<Signal>).died_if_esrch(pid)
    }

    #[cfg(target_arch = "x86_64")]
    fn read_thread_pointer(&mut self, tid: Pid) -> Result<u64> {
        let off = memoffset::offset_of!(libc::user, regs) + memoffset::offset_of!(libc::user_regs_struct, fs_base);

        crate::registers::peek_user(tid, off as u64)
    }

    #[cfg(target_arch = "aarch64")]
    fn read_thread_pointer(&mut self, tid: Pid) -> Result<u64> {
        use crate::aarch64::NT_ARM_TLS;

        let mut tpidr: u64 = 0;
        let mut iov = libc::iovec {
            iov_base: &mut tpidr as *mut u64 as *mut libc::c_void,
            iov_len: std::mem::size_of::<u64>(),
        };

        // SAFETY: `iov` describes `tpidr`, which is the size of the `NT_ARM_TLS` regset.
        let res = unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGSET,
                tid.as_raw(),
                NT_ARM_TLS as usize as *mut libc::c_void,
                &mut iov as *mut libc::iovec,
            )
        };

        Errno::result(res).died_if_esrch(tid)?;

        Ok(tpidr)
    }
}
