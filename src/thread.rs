//! Traced threads, and the dispatch of stop events into stop reasons.

use tracing::{debug, trace, warn};

use crate::breakpoints::{BreakpointSites, Watchpoint, Watchpoints};
use crate::error::Result;
use crate::process::ResumePlan;
use crate::registers::{PtraceRegisters, RegisterAccess, RegisterContext, RegisterLayout};
use crate::signals::UnixSignals;
use crate::stop::{StopEvent, StopReason};
use crate::thread_name;
use crate::tracer::{Pid, Tracer};

/// Requested state of a thread for the next process resume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResumeState {
    Running,
    Stepping,
    Suspended,
    Stopped,
}

/// Process-level collaborators consulted while dispatching a stop event.
#[derive(Clone, Copy)]
pub struct NotifyContext<'a> {
    pub breakpoints: &'a dyn BreakpointSites,
    pub watchpoints: &'a dyn Watchpoints,

    /// The process is driven by an OS emulation layer, whose thread IDs do not match ours.
    pub operating_system: bool,
}

/// Thread of a traced process.
///
/// Owns the thread's register context, so all register access must happen while the
/// thread is stopped.
#[derive(Debug)]
pub struct NativeThread<A = PtraceRegisters> {
    pid: Pid,
    tid: Pid,
    registers: RegisterContext<A>,
    resume_state: ResumeState,
    resume_signal: Option<i32>,
    stop_reason: Option<StopReason>,

    // Empty once looked up, if the thread has no name.
    name: Option<String>,
}

impl NativeThread<PtraceRegisters> {
    pub fn new(pid: Pid, tid: Pid) -> Self {
        let registers = RegisterContext::new(tid, RegisterLayout::host(), PtraceRegisters);

        Self::with_registers(pid, registers)
    }
}

impl<A: RegisterAccess> NativeThread<A> {
    pub fn with_registers(pid: Pid, registers: RegisterContext<A>) -> Self {
        Self {
            pid,
            tid: registers.tid(),
            registers,
            resume_state: ResumeState::Stopped,
            resume_signal: None,
            stop_reason: None,
            name: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn tid(&self) -> Pid {
        self.tid
    }

    pub fn registers(&self) -> &RegisterContext<A> {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterContext<A> {
        &mut self.registers
    }

    /// Thread name, read from the OS on first use.
    pub fn name(&mut self) -> Option<&str> {
        if self.name.is_none() {
            let name = match thread_name::tracee_thread_name(self.pid, self.tid) {
                Ok(name) => name,
                Err(err) => {
                    debug!(tid = self.tid.as_raw(), %err, "unable to read thread name");
                    String::new()
                },
            };

            self.name = Some(name);
        }

        self.name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn set_name(&mut self, name: Option<&str>) {
        self.name = Some(name.unwrap_or_default().to_owned());
    }

    pub fn thread_pointer(&self, tracer: &mut impl Tracer) -> Result<u64> {
        tracer.read_thread_pointer(self.tid)
    }

    pub fn resume_state(&self) -> ResumeState {
        self.resume_state
    }

    pub fn set_resume_state(&mut self, state: ResumeState) {
        self.resume_state = state;
    }

    pub fn resume_signal(&self) -> Option<i32> {
        self.resume_signal
    }

    pub fn set_resume_signal(&mut self, signo: Option<i32>) {
        self.resume_signal = signo;
    }

    /// Reason for the last stop. `None` if the stop could not be explained.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Record this thread's resume intent into `plan`.
    ///
    /// Cached registers are discarded, since they are stale as soon as the thread runs.
    pub fn will_resume(&mut self, plan: &mut ResumePlan, signals: &UnixSignals) {
        debug!(tid = self.tid.as_raw(), state = ?self.resume_state, signo = ?self.resume_signal, "will resume");

        plan.record(self.tid, self.resume_state, self.resume_signal, signals);

        self.registers.invalidate();
        self.stop_reason = None;
    }

    /// Restart this thread alone, according to its resume state.
    ///
    /// Cached registers and the stop reason are discarded unless the thread stays stopped.
    pub fn resume(&mut self, tracer: &mut impl Tracer) -> Result<()> {
        trace!(tid = self.tid.as_raw(), state = ?self.resume_state, "resume");

        if let ResumeState::Running | ResumeState::Stepping = self.resume_state {
            self.registers.invalidate();
            self.stop_reason = None;
        }

        match self.resume_state {
            ResumeState::Running => tracer.resume(self.tid, self.resume_signal),
            ResumeState::Stepping => tracer.single_step(self.tid, self.resume_signal),
            ResumeState::Suspended | ResumeState::Stopped => Ok(()),
        }
    }

    /// Derive the stop reason for `event`.
    pub fn notify(&mut self, event: StopEvent, cx: &NotifyContext<'_>) -> Result<()> {
        debug!(tid = self.tid.as_raw(), kind = event.kind(), "notify");

        match event {
            StopEvent::Exit { status } => {
                self.stop_reason = Some(StopReason::Exited { status });
            },
            StopEvent::Limbo { status } => {
                self.stop_reason = Some(StopReason::Limbo { status });
            },
            StopEvent::Signal { signo } | StopEvent::SignalDelivered { signo } => {
                self.stop_reason = Some(StopReason::Signal { signo });
            },
            StopEvent::Trace => self.trace_notify(cx)?,
            StopEvent::Breakpoint => self.break_notify(cx)?,
            StopEvent::Watchpoint { addr } => self.watch_notify(addr, cx)?,
            StopEvent::Crash { signo, reason, fault_addr } => {
                debug!(tid = self.tid.as_raw(), signo, %reason, fault_addr, "crash");
                self.stop_reason = Some(StopReason::Crash { signo, reason, fault_addr });
            },
            StopEvent::Exec => {
                self.stop_reason = Some(StopReason::Exec);
            },
        }

        Ok(())
    }

    fn break_notify(&mut self, cx: &NotifyContext<'_>) -> Result<()> {
        // Back up onto the trap instruction, so the PC addresses the breakpoint site.
        let pc = self.registers.update_after_breakpoint()?;

        debug!(tid = self.tid.as_raw(), pc = format_args!("{:#x}", pc), "breakpoint");

        self.stop_reason = match cx.breakpoints.find_by_address(pc) {
            Some(site) => {
                // Thread-specific sites may be keyed by OS-level thread IDs we can't match.
                let should_stop = site.valid_for_thread(self.tid) || cx.operating_system;

                Some(StopReason::Breakpoint { site: site.id, should_stop })
            },
            None => {
                warn!(tid = self.tid.as_raw(), pc, "breakpoint stop with no site at pc");
                None
            },
        };

        Ok(())
    }

    fn watch_notify(&mut self, addr: u64, cx: &NotifyContext<'_>) -> Result<()> {
        debug!(tid = self.tid.as_raw(), addr = format_args!("{:#x}", addr), "watchpoint");

        let slot = match self.hit_watchpoint_slot()? {
            Some(slot) => slot,
            None => return Ok(()),
        };

        self.registers.clear_watchpoint_hits()?;

        let monitored = self.registers.watchpoint_address(slot)?;

        match cx.watchpoints.find_by_address(monitored) {
            Some(wp) => {
                self.stop_reason = Some(StopReason::Watchpoint { watchpoint: wp.id });
            },
            None => {
                internal_error!(format!("no watchpoint registered for hit address {:#x}", monitored))
            },
        }

        Ok(())
    }

    fn trace_notify(&mut self, cx: &NotifyContext<'_>) -> Result<()> {
        // A watchpoint trap may be reported with a single-step trap.
        if self.hit_watchpoint_slot()?.is_some() {
            return self.watch_notify(0, cx);
        }

        self.stop_reason = Some(StopReason::Trace);

        Ok(())
    }

    fn hit_watchpoint_slot(&mut self) -> Result<Option<usize>> {
        for slot in 0..self.registers.num_hardware_watchpoints() {
            if self.registers.is_watchpoint_hit(slot)? {
                return Ok(Some(slot));
            }
        }

        Ok(None)
    }

    pub fn num_hardware_watchpoints(&self) -> usize {
        self.registers.num_hardware_watchpoints()
    }

    /// Arm the debug register slot assigned to `wp`.
    ///
    /// Returns `false` if `wp` has no slot or cannot be encoded.
    pub fn enable_hardware_watchpoint(&mut self, wp: &Watchpoint) -> Result<bool> {
        match wp.hardware_index {
            Some(slot) => self.registers.set_hardware_watchpoint(wp.addr, wp.size, wp.read, wp.write, slot),
            None => Ok(false),
        }
    }

    pub fn disable_hardware_watchpoint(&mut self, wp: &Watchpoint) -> Result<bool> {
        match wp.hardware_index {
            Some(slot) => self.registers.clear_hardware_watchpoint(slot),
            None => Ok(false),
        }
    }

    pub fn find_vacant_watchpoint_index(&mut self) -> Result<Option<usize>> {
        for slot in 0..self.registers.num_hardware_watchpoints() {
            if self.registers.is_watchpoint_vacant(slot)? {
                return Ok(Some(slot));
            }
        }

        Ok(None)
    }

    pub fn register_name_from_offset(&self, offset: usize) -> Option<&'static str> {
        self.registers.register_name_at_offset(offset)
    }
}
