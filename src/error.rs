use std::io;

use crate::registers::{RegisterId, RegisterSet};
use crate::tracer::{Pid, Restart};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Register \"{name}\" is an internal-only register, cannot access directly")]
    InternalRegister { name: String },

    #[error("Register {id} is in unrecognized set")]
    InvalidRegister { id: RegisterId },

    #[error("Reading register set {set:?} failed")]
    RegisterSetRead {
        set: RegisterSet,
        #[source]
        source: Box<Error>,
    },

    #[error("Register data has mismatched size, expected {expected}, actual {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Failed to allocate register buffer of size {size}")]
    Allocation { size: usize },

    #[error("Tracee died while stopped = {pid}")]
    TraceeDied { pid: Pid, source: nix::Error },

    #[error("Restart ({mode}) failed for thread = {pid}")]
    Restart {
        pid: Pid,
        mode: Restart,
        source: nix::Error,
    },

    #[error("Detaching with keep_stopped is not supported on Linux")]
    DetachKeepStopped,

    #[error("Unknown signal = {0}")]
    UnknownSignal(i32),

    #[error("Unsupported on this architecture: {0}")]
    Unsupported(&'static str),

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Return `true` if the error was caused by the tracee exiting or being killed
    /// between the stop and the request.
    pub fn tracee_died(&self) -> bool {
        match self {
            Error::TraceeDied { .. } => true,
            Error::Restart { source, .. } => *source == nix::errno::Errno::ESRCH,
            Error::RegisterSetRead { source, .. } => source.tracee_died(),
            _ => false,
        }
    }
}

pub(crate) trait ResultExt<T> {
    fn died_if_esrch(self, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, nix::Error> {
    // A stopped tracee can only produce `ESRCH` if it was killed out from under us.
    fn died_if_esrch(self, pid: Pid) -> Result<T> {
        self.map_err(|source| {
            if source == nix::errno::Errno::ESRCH {
                Error::TraceeDied { pid, source }
            } else {
                Error::OS(source)
            }
        })
    }
}

macro_rules! internal_error {
    ($msg: expr) => {{
        tracing::error!("internal error: {}", $msg);
        return Err($crate::error::Error::Internal($msg.into()));
    }};
}
