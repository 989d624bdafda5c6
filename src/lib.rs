#[macro_use]
pub mod error;

pub mod aarch64;
pub mod breakpoints;
pub mod host;
pub mod monitor;
pub mod process;
pub mod regex_parse;
pub mod registers;
pub mod signals;
pub mod stop;
pub mod thread;
pub mod thread_name;
pub mod tracer;
pub mod x86;

pub use error::{Error, Result};
pub use process::{NativeProcess, ProcessMessage, ResumePlan};
pub use registers::{RegisterContext, RegisterId, RegisterLayout, RegisterSet, RegisterValue};
pub use signals::UnixSignals;
pub use stop::{CrashReason, ExitStatus, StopEvent, StopReason};
pub use thread::{NativeThread, ResumeState};
pub use tracer::{Pid, PtraceTracer, Signal, Tracer};
