//! Thread names, for debugger threads and traced threads.

use std::ffi::{CStr, CString};
use std::fs;
use std::io;

use nix::errno::Errno;

use crate::error::{Error, Result};
use crate::host::MAX_THREAD_NAME_LENGTH;
use crate::tracer::Pid;

/// Name of a thread of this process.
pub fn name_of(thread: libc::pthread_t) -> Result<String> {
    let mut buf = [0 as libc::c_char; MAX_THREAD_NAME_LENGTH];

    // SAFETY: `buf` is writable for `buf.len()` bytes, and is NUL-terminated on success.
    let rc = unsafe { libc::pthread_getname_np(thread, buf.as_mut_ptr(), buf.len()) };

    if rc != 0 {
        return Err(Errno::from_i32(rc).into());
    }

    // SAFETY: `pthread_getname_np()` succeeded, so `buf` holds a C string.
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };

    Ok(name.to_string_lossy().into_owned())
}

/// Rename a thread of this process. Names longer than the OS allows are rejected by it.
pub fn set_name_of(thread: libc::pthread_t, name: &str) -> Result<()> {
    let name = CString::new(name).map_err(|err| Error::IO(io::Error::new(io::ErrorKind::InvalidInput, err)))?;

    // SAFETY: `name` is a valid C string for the duration of the call.
    let rc = unsafe { libc::pthread_setname_np(thread, name.as_ptr()) };

    if rc != 0 {
        return Err(Errno::from_i32(rc).into());
    }

    Ok(())
}

pub fn this_thread_name() -> Result<String> {
    // SAFETY: always safe to call.
    name_of(unsafe { libc::pthread_self() })
}

pub fn set_this_thread_name(name: &str) -> Result<()> {
    // SAFETY: always safe to call.
    set_name_of(unsafe { libc::pthread_self() }, name)
}

/// Name of thread `tid` of traced process `pid`.
pub fn tracee_thread_name(pid: Pid, tid: Pid) -> Result<String> {
    let path = format!("/proc/{}/task/{}/comm", pid.as_raw(), tid.as_raw());
    let comm = fs::read_to_string(path)?;

    Ok(comm.trim_end_matches('\n').to_owned())
}
