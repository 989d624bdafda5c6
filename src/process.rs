//! Traced process state, its message queue, and resume planning.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::breakpoints::{BreakpointSites, Watchpoints};
use crate::error::{Error, Result};
use crate::signals::UnixSignals;
use crate::stop::{ExitStatus, StopEvent};
use crate::thread::{NotifyContext, ResumeState};
use crate::tracer::{Pid, PtraceTracer, Tracer};

/// Message from the tracing layer about the process or one of its threads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessMessage {
    /// The process was attached and is stopped.
    Attach { pid: Pid },

    /// Thread `tid` created thread `new`.
    NewThread { tid: Pid, new: Pid },

    Stop { tid: Pid, event: StopEvent },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessState {
    Attaching,
    Running,
    Stopped,
    Exited,
    Detached,
}

/// Threads to restart on the next resume, and the signal to deliver.
///
/// Built fresh for each resume by calling [`NativeThread::will_resume()`] on every thread.
///
/// [`NativeThread::will_resume()`]: crate::thread::NativeThread::will_resume
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResumePlan {
    pub run: Vec<Pid>,
    pub step: Vec<Pid>,
    pub suspend: Vec<Pid>,
    pub signal: Option<i32>,
}

impl ResumePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tid` to the list for `state`.
    ///
    /// For running and stepping threads, a `signal` known to `signals` replaces the
    /// plan signal.
    pub fn record(&mut self, tid: Pid, state: ResumeState, signal: Option<i32>, signals: &UnixSignals) {
        let restarted = match state {
            ResumeState::Suspended | ResumeState::Stopped => {
                self.suspend.push(tid);
                false
            },
            ResumeState::Running => {
                self.run.push(tid);
                true
            },
            ResumeState::Stepping => {
                self.step.push(tid);
                true
            },
        };

        if restarted {
            if let Some(signo) = signal.filter(|signo| signals.is_valid(*signo)) {
                self.signal = Some(signo);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.run.is_empty() && self.step.is_empty()
    }
}

#[derive(Debug)]
struct Shared {
    state: ProcessState,
    exit_status: Option<ExitStatus>,
    queue: VecDeque<ProcessMessage>,
}

/// Traced process.
#[derive(Debug)]
pub struct NativeProcess<T = PtraceTracer> {
    pid: Pid,
    tracer: T,
    signals: &'static UnixSignals,

    /// Threads are managed by an OS emulation layer.
    operating_system: bool,

    shared: Mutex<Shared>,
}

impl NativeProcess<PtraceTracer> {
    pub fn new(pid: Pid) -> Self {
        Self::with_tracer(pid, PtraceTracer::new(), UnixSignals::host())
    }
}

impl<T: Tracer> NativeProcess<T> {
    pub fn with_tracer(pid: Pid, tracer: T, signals: &'static UnixSignals) -> Self {
        let shared = Shared {
            state: ProcessState::Attaching,
            exit_status: None,
            queue: VecDeque::new(),
        };

        Self {
            pid,
            tracer,
            signals,
            operating_system: false,
            shared: Mutex::new(shared),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn signals(&self) -> &'static UnixSignals {
        self.signals
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut T {
        &mut self.tracer
    }

    pub fn operating_system(&self) -> bool {
        self.operating_system
    }

    /// Set whether an OS emulation layer manages threads, so thread-specific breakpoints
    /// must be reported on any thread.
    pub fn set_operating_system(&mut self, operating_system: bool) {
        self.operating_system = operating_system;
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>> {
        self.shared
            .lock()
            .map_err(|_| Error::Internal("process state lock poisoned".into()))
    }

    pub fn state(&self) -> Result<ProcessState> {
        Ok(self.lock()?.state)
    }

    pub fn exit_status(&self) -> Result<Option<ExitStatus>> {
        Ok(self.lock()?.exit_status)
    }

    /// Update process state for `message`, and queue it for thread dispatch.
    ///
    /// Attach messages only update state.
    pub fn send_message(&self, message: ProcessMessage) -> Result<()> {
        let mut shared = self.lock()?;

        debug!(pid = self.pid.as_raw(), ?message, "process message");

        match message {
            ProcessMessage::Attach { .. } => {
                shared.state = ProcessState::Stopped;
                return Ok(());
            },
            ProcessMessage::NewThread { tid, new } => {
                internal_error!(format!("unexpected new thread message, tid = {}, new = {}", tid, new))
            },
            ProcessMessage::Stop { event, .. } => match event {
                StopEvent::Exit { status } | StopEvent::Limbo { status } => {
                    info!(pid = self.pid.as_raw(), %status, "process exit status");
                    shared.exit_status = Some(status);
                    shared.state = ProcessState::Exited;
                },
                _ => {
                    shared.state = ProcessState::Stopped;
                },
            },
        }

        shared.queue.push_back(message);

        Ok(())
    }

    /// Pop the oldest queued message.
    pub fn next_message(&self) -> Result<Option<ProcessMessage>> {
        Ok(self.lock()?.queue.pop_front())
    }

    /// Start a new, empty resume plan.
    pub fn will_resume(&self) -> ResumePlan {
        ResumePlan::new()
    }

    /// Restart the threads of `plan`.
    ///
    /// The plan signal is delivered once, to the first restarted thread. Stepping threads
    /// are restarted before running threads.
    pub fn resume(&mut self, plan: &ResumePlan) -> Result<()> {
        info!(
            pid = self.pid.as_raw(),
            run = plan.run.len(),
            step = plan.step.len(),
            suspend = plan.suspend.len(),
            signo = ?plan.signal,
            "resuming"
        );

        let mut signal = plan.signal;

        for tid in &plan.step {
            self.tracer.single_step(*tid, signal.take())?;
        }

        for tid in &plan.run {
            self.tracer.resume(*tid, signal.take())?;
        }

        self.lock()?.state = ProcessState::Running;

        Ok(())
    }

    /// Detach from the process.
    ///
    /// Leaving the process stopped is not supported, and fails without detaching.
    pub fn detach(&mut self, keep_stopped: bool) -> Result<()> {
        if keep_stopped {
            return Err(Error::DetachKeepStopped);
        }

        self.tracer.detach(self.pid)?;
        self.lock()?.state = ProcessState::Detached;

        Ok(())
    }

    /// Context for dispatching a stop event to one of this process's threads.
    pub fn notify_context<'a>(
        &self,
        breakpoints: &'a dyn BreakpointSites,
        watchpoints: &'a dyn Watchpoints,
    ) -> NotifyContext<'a> {
        NotifyContext {
            breakpoints,
            watchpoints,
            operating_system: self.operating_system,
        }
    }
}
