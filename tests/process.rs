#[macro_use]
mod support;

use anyhow::Result;
use dbgshim::breakpoints::{BreakpointSiteList, WatchpointList};
use dbgshim::process::ProcessState;
use dbgshim::{Error, ExitStatus, NativeProcess, ProcessMessage, ResumePlan, ResumeState, StopEvent, UnixSignals};
use pretty_assertions::assert_eq;

use support::{fake_thread, Call, FakeRegisters, FakeTracer};

fn process() -> NativeProcess<FakeTracer> {
    NativeProcess::with_tracer(pid!(100), FakeTracer::default(), UnixSignals::host())
}

#[test]
fn test_messages_update_state() -> Result<()> {
    support::init_tracing();

    let process = process();
    assert_eq!(process.state()?, ProcessState::Attaching);

    // Attach messages are not queued.
    process.send_message(ProcessMessage::Attach { pid: pid!(100) })?;
    assert_eq!(process.state()?, ProcessState::Stopped);
    assert_eq!(process.next_message()?, None);

    let trace = ProcessMessage::Stop { tid: pid!(101), event: StopEvent::Trace };
    process.send_message(trace)?;
    assert_eq!(process.state()?, ProcessState::Stopped);

    let exit = ProcessMessage::Stop {
        tid: pid!(100),
        event: StopEvent::Exit { status: ExitStatus::Code(4) },
    };
    process.send_message(exit)?;
    assert_eq!(process.state()?, ProcessState::Exited);
    assert_eq!(process.exit_status()?, Some(ExitStatus::Code(4)));

    assert_eq!(process.next_message()?, Some(trace));
    assert_eq!(process.next_message()?, Some(exit));
    assert_eq!(process.next_message()?, None);

    Ok(())
}

#[test]
fn test_limbo_records_exit_status() -> Result<()> {
    let process = process();

    let limbo = ProcessMessage::Stop {
        tid: pid!(100),
        event: StopEvent::Limbo { status: ExitStatus::Signal(libc::SIGABRT) },
    };
    process.send_message(limbo)?;

    assert_eq!(process.exit_status()?, Some(ExitStatus::Signal(libc::SIGABRT)));
    assert_eq!(process.next_message()?, Some(limbo));

    Ok(())
}

#[test]
fn test_new_thread_message_is_rejected() {
    let process = process();

    let err = process
        .send_message(ProcessMessage::NewThread { tid: pid!(100), new: pid!(101) })
        .unwrap_err();

    assert_matches!(err, Error::Internal(..));
    assert_eq!(process.next_message().unwrap(), None);
}

#[test]
fn test_resume_plan_last_signal_wins() {
    let signals = UnixSignals::linux();
    let mut plan = ResumePlan::new();

    plan.record(pid!(1), ResumeState::Running, Some(libc::SIGUSR1), &signals);
    plan.record(pid!(2), ResumeState::Stepping, Some(libc::SIGUSR2), &signals);
    plan.record(pid!(3), ResumeState::Suspended, Some(libc::SIGINT), &signals);
    plan.record(pid!(4), ResumeState::Running, Some(12345), &signals);
    plan.record(pid!(5), ResumeState::Stopped, None, &signals);
    plan.record(pid!(6), ResumeState::Running, None, &signals);

    let expected = ResumePlan {
        run: vec![pid!(1), pid!(4), pid!(6)],
        step: vec![pid!(2)],
        suspend: vec![pid!(3), pid!(5)],
        signal: Some(libc::SIGUSR2),
    };

    assert_eq!(plan, expected);
}

#[test]
fn test_will_resume_invalidates_registers() -> Result<()> {
    use dbgshim::registers::{CacheState, RegisterSet};

    let breakpoints = BreakpointSiteList::new();
    let watchpoints = WatchpointList::new();

    let process = process();
    let cx = process.notify_context(&breakpoints, &watchpoints);

    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    thread.notify(StopEvent::Trace, &cx)?;
    thread.registers_mut().pc()?;
    assert_eq!(thread.registers().cache_state(RegisterSet::GeneralPurpose), CacheState::Loaded);

    let mut plan = process.will_resume();
    thread.set_resume_state(ResumeState::Stepping);
    thread.set_resume_signal(Some(libc::SIGCHLD));
    thread.will_resume(&mut plan, process.signals());

    assert_eq!(thread.registers().cache_state(RegisterSet::GeneralPurpose), CacheState::Stale);
    assert_eq!(thread.stop_reason(), None);
    assert_eq!(plan.step, vec![pid!(100)]);
    assert_eq!(plan.signal, Some(libc::SIGCHLD));

    Ok(())
}

#[test]
fn test_resume_drives_tracer() -> Result<()> {
    let mut process = process();

    let plan = ResumePlan {
        run: vec![pid!(101), pid!(102)],
        step: vec![pid!(100)],
        suspend: vec![pid!(103)],
        signal: Some(libc::SIGUSR1),
    };

    process.resume(&plan)?;

    let expected = vec![
        Call::SingleStep { tid: pid!(100), signo: Some(libc::SIGUSR1) },
        Call::Resume { tid: pid!(101), signo: None },
        Call::Resume { tid: pid!(102), signo: None },
    ];

    assert_eq!(process.tracer().calls, expected);
    assert_eq!(process.state()?, ProcessState::Running);

    Ok(())
}

#[test]
fn test_thread_resume() -> Result<()> {
    let mut tracer = FakeTracer::default();
    tracer.thread_pointer = 0x7f00_0000_1000;

    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    assert_eq!(thread.thread_pointer(&mut tracer)?, 0x7f00_0000_1000);

    thread.set_resume_state(ResumeState::Suspended);
    thread.resume(&mut tracer)?;
    assert!(tracer.calls.is_empty());

    thread.set_resume_state(ResumeState::Running);
    thread.set_resume_signal(Some(libc::SIGTERM));
    thread.resume(&mut tracer)?;

    assert_eq!(tracer.calls, vec![Call::Resume { tid: pid!(100), signo: Some(libc::SIGTERM) }]);

    Ok(())
}

#[test]
fn test_thread_resume_discards_cached_state() -> Result<()> {
    use dbgshim::registers::x86_64::Reg;
    use dbgshim::registers::{CacheState, RegisterSet};

    let breakpoints = BreakpointSiteList::new();
    let watchpoints = WatchpointList::new();
    let process = process();
    let cx = process.notify_context(&breakpoints, &watchpoints);

    let mut regs = FakeRegisters::x86_64();
    regs.poke(Reg::Rip, 0x1000);

    let mut thread = fake_thread(100, regs);
    thread.notify(StopEvent::Trace, &cx)?;
    assert_eq!(thread.registers_mut().pc()?, 0x1000);

    thread.set_resume_state(ResumeState::Running);
    thread.resume(&mut FakeTracer::default())?;

    assert_eq!(thread.registers().cache_state(RegisterSet::GeneralPurpose), CacheState::Stale);
    assert_eq!(thread.stop_reason(), None);

    // The thread ran, so the next read sees its new registers.
    thread.registers_mut().access_mut().poke(Reg::Rip, 0x2000);
    assert_eq!(thread.registers_mut().pc()?, 0x2000);

    Ok(())
}

#[test]
fn test_suspended_thread_keeps_cached_state() -> Result<()> {
    use dbgshim::registers::{CacheState, RegisterSet};

    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    thread.registers_mut().pc()?;

    thread.set_resume_state(ResumeState::Suspended);
    thread.resume(&mut FakeTracer::default())?;

    assert_eq!(thread.registers().cache_state(RegisterSet::GeneralPurpose), CacheState::Loaded);

    Ok(())
}

#[test]
fn test_failed_resume_leaves_process_stopped() -> Result<()> {
    let mut process = process();
    process.send_message(ProcessMessage::Attach { pid: pid!(100) })?;
    process.tracer_mut().dead = Some(pid!(101));

    let plan = ResumePlan {
        run: vec![pid!(100), pid!(101), pid!(102)],
        ..ResumePlan::default()
    };

    let err = process.resume(&plan).unwrap_err();
    assert_matches!(err, Error::Restart { .. });
    assert!(err.tracee_died());

    assert_eq!(process.tracer().calls, vec![Call::Resume { tid: pid!(100), signo: None }]);
    assert_eq!(process.state()?, ProcessState::Stopped);

    Ok(())
}

#[test]
fn test_detach_keep_stopped_is_unsupported() -> Result<()> {
    let mut process = process();

    let err = process.detach(true).unwrap_err();
    assert_matches!(err, Error::DetachKeepStopped);
    assert!(process.tracer().calls.is_empty());

    process.detach(false)?;
    assert_eq!(process.tracer().calls, vec![Call::Detach { pid: pid!(100) }]);
    assert_eq!(process.state()?, ProcessState::Detached);

    Ok(())
}

#[test]
fn test_operating_system_flag() {
    let breakpoints = BreakpointSiteList::new();
    let watchpoints = WatchpointList::new();

    let mut process = process();
    assert!(!process.notify_context(&breakpoints, &watchpoints).operating_system);

    process.set_operating_system(true);
    assert!(process.notify_context(&breakpoints, &watchpoints).operating_system);
}
