//! Stop events reported for traced threads, and the stop reasons derived from them.

use std::fmt;

use crate::breakpoints::{BreakpointSiteId, WatchpointId};
use crate::signals::UnixSignals;

/// Termination status of a thread or process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    Code(i32),

    /// Killed by the signal.
    Signal(i32),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exited with status = {}", code),
            ExitStatus::Signal(signo) => write!(f, "terminated by signal = {}", signo),
        }
    }
}

/// Cause of a synchronous fault signal, decoded from `siginfo_t::si_code`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CrashReason {
    // SIGSEGV
    InvalidAddress,
    PrivilegedAddress,

    // SIGILL
    IllegalOpcode,
    IllegalOperand,
    IllegalAddressingMode,
    IllegalTrap,
    PrivilegedOpcode,
    PrivilegedRegister,
    CoprocessorError,
    InternalStackError,

    // SIGBUS
    IllegalAlignment,
    IllegalAddress,
    HardwareError,

    // SIGFPE
    IntegerDivideByZero,
    IntegerOverflow,
    FloatDivideByZero,
    FloatOverflow,
    FloatUnderflow,
    FloatInexactResult,
    FloatInvalidOperation,
    FloatSubscriptRange,
}

impl CrashReason {
    /// Decode a crash reason. Returns `None` if `signo` is not a fault signal, or if
    /// `code` does not describe a fault, as for a signal sent with `kill(2)`.
    pub fn from_siginfo(signo: i32, code: i32) -> Option<Self> {
        use CrashReason::*;

        let reason = match signo {
            libc::SIGSEGV => match code {
                1 => InvalidAddress,
                2 => PrivilegedAddress,

                // `SI_KERNEL`, as for a general-protection fault on a non-canonical address.
                0x80 => InvalidAddress,
                _ => return None,
            },
            libc::SIGILL => match code {
                1 => IllegalOpcode,
                2 => IllegalOperand,
                3 => IllegalAddressingMode,
                4 => IllegalTrap,
                5 => PrivilegedOpcode,
                6 => PrivilegedRegister,
                7 => CoprocessorError,
                8 => InternalStackError,
                _ => return None,
            },
            libc::SIGBUS => match code {
                1 => IllegalAlignment,
                2 => IllegalAddress,
                3 => HardwareError,
                _ => return None,
            },
            libc::SIGFPE => match code {
                1 => IntegerDivideByZero,
                2 => IntegerOverflow,
                3 => FloatDivideByZero,
                4 => FloatOverflow,
                5 => FloatUnderflow,
                6 => FloatInexactResult,
                7 => FloatInvalidOperation,
                8 => FloatSubscriptRange,
                _ => return None,
            },
            _ => return None,
        };

        Some(reason)
    }

    pub fn description(&self) -> &'static str {
        use CrashReason::*;

        match self {
            InvalidAddress => "invalid address",
            PrivilegedAddress => "address access protected",
            IllegalOpcode => "illegal instruction",
            IllegalOperand => "illegal instruction operand",
            IllegalAddressingMode => "illegal addressing mode",
            IllegalTrap => "illegal trap",
            PrivilegedOpcode => "privileged instruction",
            PrivilegedRegister => "privileged register",
            CoprocessorError => "coprocessor error",
            InternalStackError => "internal stack error",
            IllegalAlignment => "illegal alignment",
            IllegalAddress => "illegal address",
            HardwareError => "hardware error",
            IntegerDivideByZero => "integer divide by zero",
            IntegerOverflow => "integer overflow",
            FloatDivideByZero => "floating point divide by zero",
            FloatOverflow => "floating point overflow",
            FloatUnderflow => "floating point underflow",
            FloatInexactResult => "inexact floating point result",
            FloatInvalidOperation => "invalid floating point operation",
            FloatSubscriptRange => "invalid floating point subscript range",
        }
    }
}

impl fmt::Display for CrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Why a traced thread stopped, as observed by the tracing layer.
///
/// Each event is consumed once by the thread that owns it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopEvent {
    Exit { status: ExitStatus },

    /// Exiting, but not yet reaped.
    Limbo { status: ExitStatus },

    /// Stopped with `signo` pending.
    Signal { signo: i32 },

    /// `signo` was delivered to the thread by the debugger.
    SignalDelivered { signo: i32 },

    /// Single-step trap.
    Trace,

    /// Software breakpoint trap.
    Breakpoint,

    /// Hardware watchpoint trap, with the faulting data address if known.
    Watchpoint { addr: u64 },

    Crash { signo: i32, reason: CrashReason, fault_addr: u64 },

    /// Replaced its program image.
    Exec,
}

impl StopEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StopEvent::Exit { .. } => "exit",
            StopEvent::Limbo { .. } => "limbo",
            StopEvent::Signal { .. } => "signal",
            StopEvent::SignalDelivered { .. } => "signal-delivered",
            StopEvent::Trace => "trace",
            StopEvent::Breakpoint => "breakpoint",
            StopEvent::Watchpoint { .. } => "watchpoint",
            StopEvent::Crash { .. } => "crash",
            StopEvent::Exec => "exec",
        }
    }
}

/// Debugger-level explanation of a thread stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    Breakpoint { site: BreakpointSiteId, should_stop: bool },
    Watchpoint { watchpoint: WatchpointId },
    Signal { signo: i32 },
    Trace,
    Exec,
    Crash { signo: i32, reason: CrashReason, fault_addr: u64 },
    Limbo { status: ExitStatus },
    Exited { status: ExitStatus },
}

impl StopReason {
    /// Return `true` if the stop should be reported to the user.
    pub fn should_stop(&self) -> bool {
        match self {
            StopReason::Breakpoint { should_stop, .. } => *should_stop,
            StopReason::Limbo { .. } | StopReason::Exited { .. } => false,
            _ => true,
        }
    }

    pub fn description(&self, signals: &UnixSignals) -> String {
        match self {
            StopReason::Breakpoint { site, .. } => format!("breakpoint {}", site),
            StopReason::Watchpoint { watchpoint } => format!("watchpoint {}", watchpoint),
            StopReason::Signal { signo } => match signals.name(*signo) {
                Some(name) => format!("signal {}", name),
                None => format!("signal {}", signo),
            },
            StopReason::Trace => "trace".into(),
            StopReason::Exec => "exec".into(),
            StopReason::Crash { reason, fault_addr, .. } => format!("{} (fault address: {:#x})", reason, fault_addr),
            StopReason::Limbo { status } => format!("thread is exiting: {}", status),
            StopReason::Exited { status } => format!("thread {}", status),
        }
    }
}
