//! Turns `wait(2)` statuses of a traced process into process messages.

use std::collections::BTreeMap;

use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use tracing::{debug, info, trace};

use crate::error::{Result, ResultExt};
use crate::process::ProcessMessage;
use crate::stop::{CrashReason, ExitStatus, StopEvent};
use crate::tracer::{Pid, Signal};

// `si_code` values for `SIGTRAP`, from `include/uapi/asm-generic/siginfo.h`.
const TRAP_BRKPT: i32 = 1;
const TRAP_TRACE: i32 = 2;
const TRAP_HWBKPT: i32 = 4;
const SI_KERNEL: i32 = 0x80;

/// Options applied to the traced process when it first stops.
pub const DEFAULT_OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_TRACEEXEC)
    .union(Options::PTRACE_O_TRACEEXIT)
    .union(Options::PTRACE_O_TRACECLONE);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    // Self-attached via `PTRACE_TRACEME`, expecting the `SIGTRAP` of its `execve()`.
    Spawned,

    // Newly-attached, expecting a `SIGSTOP`.
    Attaching,

    Running,

    // Stopped at `PTRACE_EVENT_EXIT`, not yet reaped.
    Exiting,
}

/// Decoded `waitpid(2)` status of a traced thread.
///
/// Signals are kept as raw numbers, so stops for real-time signals can be reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitEvent {
    /// Exited with a status code.
    Exited(Pid, i32),

    /// Killed by a signal.
    Signaled(Pid, i32),

    /// Signal-delivery-stop or group-stop.
    Stopped(Pid, i32),

    /// `PTRACE_EVENT_*` stop, with the stop signal and event code.
    PtraceEvent(Pid, i32, i32),
}

impl WaitEvent {
    /// Decode the raw status of `tid`. Returns `None` for statuses a tracer never waits
    /// for, such as syscall-stops without `PTRACE_O_TRACESYSGOOD` or continues.
    pub fn from_raw(tid: Pid, status: libc::c_int) -> Option<Self> {
        if libc::WIFEXITED(status) {
            return Some(WaitEvent::Exited(tid, libc::WEXITSTATUS(status)));
        }

        if libc::WIFSIGNALED(status) {
            return Some(WaitEvent::Signaled(tid, libc::WTERMSIG(status)));
        }

        if libc::WIFSTOPPED(status) {
            let signo = libc::WSTOPSIG(status);
            let event = (status >> 16) & 0xff;

            if event != 0 {
                return Some(WaitEvent::PtraceEvent(tid, signo, event));
            }

            // `PTRACE_O_TRACESYSGOOD` is never set, so `SIGTRAP | 0x80` is not a stop signal.
            if signo & 0x80 != 0 {
                return None;
            }

            return Some(WaitEvent::Stopped(tid, signo));
        }

        None
    }
}

/// Waits on the threads of one traced process and classifies their stops.
#[derive(Clone, Debug)]
pub struct Monitor {
    pid: Pid,
    options: Options,
    threads: BTreeMap<i32, State>,
}

impl Monitor {
    /// Monitor a child which requested `PTRACE_TRACEME` before `execve()`.
    pub fn spawned(pid: Pid) -> Self {
        Self::new(pid, State::Spawned)
    }

    /// Monitor a process the caller has sent `PTRACE_ATTACH`.
    pub fn attached(pid: Pid) -> Self {
        Self::new(pid, State::Attaching)
    }

    fn new(pid: Pid, state: State) -> Self {
        let mut threads = BTreeMap::new();
        threads.insert(pid.as_raw(), state);

        Self { pid, options: DEFAULT_OPTIONS, threads }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Set the ptrace options applied at the initial stop.
    ///
    /// `PTRACE_O_TRACEEXEC` and `PTRACE_O_TRACEEXIT` are always set, since stop
    /// classification depends on them.
    pub fn set_options(&mut self, options: Options) {
        self.options = options | Options::PTRACE_O_TRACEEXEC | Options::PTRACE_O_TRACEEXIT;
    }

    /// Wait for the next message from any thread of the process.
    ///
    /// Returns `None` once there is nothing left to wait on.
    pub fn wait(&mut self) -> Result<Option<ProcessMessage>> {
        loop {
            if self.threads.is_empty() {
                debug!("no threads to wait on");
                return Ok(None);
            }

            let mut raw: libc::c_int = 0;

            // SAFETY: `raw` is a valid out-pointer for the wait status.
            let res = unsafe { libc::waitpid(-1, &mut raw, libc::__WALL) };

            let tid = match Errno::result(res) {
                Ok(tid) => Pid::from_raw(tid),
                Err(Errno::ECHILD) => return Ok(None),
                Err(err) => return Err(err.into()),
            };

            let status = match WaitEvent::from_raw(tid, raw) {
                Some(status) => status,
                None => internal_error!(format!("unexpected wait status = {:#x}", raw)),
            };

            trace!(?status, "wait status");

            if let Some(message) = self.handle(status)? {
                return Ok(Some(message));
            }
        }
    }

    // Returns `None` for stops consumed internally.
    fn handle(&mut self, status: WaitEvent) -> Result<Option<ProcessMessage>> {
        let message = match status {
            WaitEvent::Exited(tid, code) => {
                self.remove_thread(tid);
                let event = StopEvent::Exit { status: ExitStatus::Code(code) };
                ProcessMessage::Stop { tid, event }
            },
            WaitEvent::Signaled(tid, signo) => {
                self.remove_thread(tid);
                let event = StopEvent::Exit { status: ExitStatus::Signal(signo) };
                ProcessMessage::Stop { tid, event }
            },
            WaitEvent::Stopped(tid, signo) => match self.threads.get(&tid.as_raw()).copied() {
                Some(State::Spawned) if signo == libc::SIGTRAP => {
                    // Post-`execve()` trap of a `PTRACE_TRACEME` child. Options set now
                    // are inherited by any auto-attached threads.
                    ptrace::setoptions(tid, self.options).died_if_esrch(tid)?;
                    self.set_state(tid, State::Running);

                    ProcessMessage::Attach { pid: tid }
                },
                Some(State::Attaching) | None if signo == libc::SIGSTOP => {
                    self.set_state(tid, State::Running);

                    if tid == self.pid {
                        ptrace::setoptions(tid, self.options).died_if_esrch(tid)?;
                        ProcessMessage::Attach { pid: tid }
                    } else {
                        // Attach-stop of a cloned thread, already reported by its creator.
                        ptrace::cont(tid, None::<Signal>).died_if_esrch(tid)?;
                        return Ok(None);
                    }
                },
                _ => {
                    let event = self.signal_stop(tid, signo)?;
                    ProcessMessage::Stop { tid, event }
                },
            },
            WaitEvent::PtraceEvent(tid, _signo, code) => match code {
                libc::PTRACE_EVENT_CLONE => {
                    let new = Pid::from_raw(ptrace::getevent(tid).died_if_esrch(tid)? as u32 as i32);

                    if !self.threads.contains_key(&new.as_raw()) {
                        info!(tid = tid.as_raw(), new = new.as_raw(), "new thread");
                        self.set_state(new, State::Attaching);
                    }

                    ProcessMessage::NewThread { tid, new }
                },
                libc::PTRACE_EVENT_EXEC => {
                    // After an off-leader exec, the exec-ing thread assumes the leader's ID.
                    let old = Pid::from_raw(ptrace::getevent(tid).died_if_esrch(tid)? as u32 as i32);

                    if old != tid {
                        self.remove_thread(old);
                    }

                    self.set_state(tid, State::Running);

                    ProcessMessage::Stop { tid, event: StopEvent::Exec }
                },
                libc::PTRACE_EVENT_EXIT => {
                    // The pending wait status, of which only the low 16 bits are meaningful.
                    let status = ptrace::getevent(tid).died_if_esrch(tid)? as u16;

                    self.set_state(tid, State::Exiting);

                    let event = StopEvent::Limbo { status: parse_exit_status(status) };
                    ProcessMessage::Stop { tid, event }
                },
                _ => internal_error!(format!("unexpected ptrace-event-stop code = {}", code)),
            },
        };

        Ok(Some(message))
    }

    fn signal_stop(&mut self, tid: Pid, signo: i32) -> Result<StopEvent> {
        let info = match ptrace::getsiginfo(tid) {
            Ok(info) => info,
            Err(Errno::EINVAL) => {
                // Group-stop, which has no `siginfo`.
                return Ok(StopEvent::Signal { signo });
            },
            Err(err) => return Err::<StopEvent, _>(err).died_if_esrch(tid),
        };

        // SAFETY: the kernel fills `si_addr` for the fault signals it is read for, and
        // `si_pid` for signals sent by a process.
        let (addr, sender) = unsafe { (info.si_addr() as u64, info.si_pid()) };

        let sent_by_us = sender == nix::unistd::getpid().as_raw() && !is_fault(info.si_code);

        Ok(classify_signal(signo, info.si_code, addr, sent_by_us))
    }

    fn set_state(&mut self, tid: Pid, state: State) {
        debug!(tid = tid.as_raw(), ?state, "setting thread state");
        self.threads.insert(tid.as_raw(), state);
    }

    fn remove_thread(&mut self, tid: Pid) {
        info!(tid = tid.as_raw(), "removing thread");
        self.threads.remove(&tid.as_raw());
    }
}

// Kernel-generated codes are positive, `si_pid` is not meaningful for them.
fn is_fault(code: i32) -> bool {
    code > 0 && code != SI_KERNEL
}

/// Classify a signal-delivery-stop from its `siginfo_t`.
///
/// `sent_by_tracer` marks signals the debugger itself delivered to the thread.
pub fn classify_signal(signo: i32, code: i32, addr: u64, sent_by_tracer: bool) -> StopEvent {
    if signo == libc::SIGTRAP {
        match code {
            TRAP_BRKPT | SI_KERNEL => return StopEvent::Breakpoint,
            TRAP_TRACE => return StopEvent::Trace,
            TRAP_HWBKPT => return StopEvent::Watchpoint { addr },
            _ => {},
        }
    }

    if let Some(reason) = CrashReason::from_siginfo(signo, code) {
        return StopEvent::Crash { signo, reason, fault_addr: addr };
    }

    if sent_by_tracer {
        StopEvent::SignalDelivered { signo }
    } else {
        StopEvent::Signal { signo }
    }
}

/// Decode a 16-bit wait status word.
///
/// If bits `[6:0]` are nonzero, the process is being killed by that signal. Otherwise it
/// is exiting with the code in bits `[15:8]`.
pub fn parse_exit_status(status: u16) -> ExitStatus {
    let signo = i32::from(status & 0x7f);

    if signo == 0 {
        ExitStatus::Code(i32::from((status >> 8) as u8))
    } else {
        ExitStatus::Signal(signo)
    }
}
