#[macro_use]
mod support;

use anyhow::Result;
use dbgshim::breakpoints::{BreakpointSite, BreakpointSiteId, BreakpointSiteList, Watchpoint, WatchpointId, WatchpointList};
use dbgshim::registers::x86_64::Reg;
use dbgshim::stop::CrashReason;
use dbgshim::thread::NotifyContext;
use dbgshim::x86::DebugRegister;
use dbgshim::{Error, ExitStatus, StopEvent, StopReason, UnixSignals};
use pretty_assertions::assert_eq;

use support::{fake_thread, FakeRegisters};

const SITE_ADDR: u64 = 0x40_1000;

fn sites(site: Option<BreakpointSite>) -> BreakpointSiteList {
    let mut list = BreakpointSiteList::new();

    if let Some(site) = site {
        list.add(site);
    }

    list
}

fn stopped_after_trap() -> FakeRegisters {
    let mut regs = FakeRegisters::x86_64();

    // `int3` has executed, so the PC is one byte past the site.
    regs.poke(Reg::Rip, SITE_ADDR + 1);

    regs
}

fn cx<'a>(breakpoints: &'a BreakpointSiteList, watchpoints: &'a WatchpointList, operating_system: bool) -> NotifyContext<'a> {
    NotifyContext { breakpoints, watchpoints, operating_system }
}

#[test]
fn test_breakpoint_for_this_thread() -> Result<()> {
    support::init_tracing();

    let breakpoints = sites(Some(BreakpointSite::new(BreakpointSiteId(3), SITE_ADDR)));
    let watchpoints = WatchpointList::new();

    let mut thread = fake_thread(100, stopped_after_trap());
    thread.notify(StopEvent::Breakpoint, &cx(&breakpoints, &watchpoints, false))?;

    let expected = StopReason::Breakpoint { site: BreakpointSiteId(3), should_stop: true };
    assert_eq!(thread.stop_reason(), Some(&expected));

    // The PC was rewound onto the site.
    assert_eq!(thread.registers().access().peek(Reg::Rip), SITE_ADDR);

    Ok(())
}

#[test]
fn test_breakpoint_for_other_thread() -> Result<()> {
    let site = BreakpointSite::new(BreakpointSiteId(3), SITE_ADDR).for_thread(pid!(200));
    let breakpoints = sites(Some(site));
    let watchpoints = WatchpointList::new();

    let mut thread = fake_thread(100, stopped_after_trap());
    thread.notify(StopEvent::Breakpoint, &cx(&breakpoints, &watchpoints, false))?;

    let reason = thread.stop_reason().unwrap();
    assert_eq!(reason, &StopReason::Breakpoint { site: BreakpointSiteId(3), should_stop: false });
    assert!(!reason.should_stop());

    // Thread IDs of an OS emulation layer can't be matched, so the site always stops.
    let mut thread = fake_thread(100, stopped_after_trap());
    thread.notify(StopEvent::Breakpoint, &cx(&breakpoints, &watchpoints, true))?;

    let reason = thread.stop_reason().unwrap();
    assert_eq!(reason, &StopReason::Breakpoint { site: BreakpointSiteId(3), should_stop: true });

    Ok(())
}

#[test]
fn test_breakpoint_without_site() -> Result<()> {
    let breakpoints = sites(Some(BreakpointSite::new(BreakpointSiteId(3), 0x50_0000)));
    let watchpoints = WatchpointList::new();

    let mut thread = fake_thread(100, stopped_after_trap());
    thread.notify(StopEvent::Breakpoint, &cx(&breakpoints, &watchpoints, false))?;

    assert_eq!(thread.stop_reason(), None);

    Ok(())
}

fn watched(slot: usize, addr: u64) -> FakeRegisters {
    let mut regs = FakeRegisters::x86_64();
    regs.debug[slot] = addr;
    regs.debug[DebugRegister::Dr6 as usize] = 0xffff_0ff0 | (1 << slot);
    regs
}

fn watchpoint_list(addr: u64) -> WatchpointList {
    let mut list = WatchpointList::new();
    let mut wp = Watchpoint::new(WatchpointId(7), addr, 8);
    wp.hardware_index = Some(1);
    list.add(wp);
    list
}

#[test]
fn test_watchpoint_hit() -> Result<()> {
    let breakpoints = sites(None);
    let watchpoints = watchpoint_list(0x60_0000);

    let mut thread = fake_thread(100, watched(1, 0x60_0000));
    thread.notify(StopEvent::Watchpoint { addr: 0x60_0000 }, &cx(&breakpoints, &watchpoints, false))?;

    assert_eq!(thread.stop_reason(), Some(&StopReason::Watchpoint { watchpoint: WatchpointId(7) }));

    // Hit latches were cleared.
    let dr6 = thread.registers().access().debug[DebugRegister::Dr6 as usize];
    assert_eq!(dr6 & 0xf, 0);

    Ok(())
}

#[test]
fn test_watchpoint_without_hit_is_ignored() -> Result<()> {
    let breakpoints = sites(None);
    let watchpoints = watchpoint_list(0x60_0000);

    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    thread.notify(StopEvent::Watchpoint { addr: 0x60_0000 }, &cx(&breakpoints, &watchpoints, false))?;

    assert_eq!(thread.stop_reason(), None);

    Ok(())
}

#[test]
fn test_watchpoint_hit_with_unknown_address() {
    let breakpoints = sites(None);
    let watchpoints = watchpoint_list(0x60_0000);

    let mut thread = fake_thread(100, watched(0, 0x70_0000));
    let err = thread
        .notify(StopEvent::Watchpoint { addr: 0x70_0000 }, &cx(&breakpoints, &watchpoints, false))
        .unwrap_err();

    assert_matches!(err, Error::Internal(..));
}

#[test]
fn test_trace_with_watchpoint_hit_is_watchpoint() -> Result<()> {
    let breakpoints = sites(None);
    let watchpoints = watchpoint_list(0x60_0000);

    let mut thread = fake_thread(100, watched(1, 0x60_0000));
    thread.notify(StopEvent::Trace, &cx(&breakpoints, &watchpoints, false))?;

    assert_eq!(thread.stop_reason(), Some(&StopReason::Watchpoint { watchpoint: WatchpointId(7) }));

    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    thread.notify(StopEvent::Trace, &cx(&breakpoints, &watchpoints, false))?;

    assert_eq!(thread.stop_reason(), Some(&StopReason::Trace));

    Ok(())
}

#[test]
fn test_direct_stop_reasons() -> Result<()> {
    let breakpoints = sites(None);
    let watchpoints = WatchpointList::new();
    let cx = cx(&breakpoints, &watchpoints, false);

    let mut thread = fake_thread(100, FakeRegisters::x86_64());

    let cases = vec![
        (StopEvent::Signal { signo: libc::SIGUSR1 }, StopReason::Signal { signo: libc::SIGUSR1 }),
        (StopEvent::SignalDelivered { signo: libc::SIGINT }, StopReason::Signal { signo: libc::SIGINT }),
        (StopEvent::Exec, StopReason::Exec),
        (
            StopEvent::Crash { signo: libc::SIGSEGV, reason: CrashReason::InvalidAddress, fault_addr: 0x8 },
            StopReason::Crash { signo: libc::SIGSEGV, reason: CrashReason::InvalidAddress, fault_addr: 0x8 },
        ),
        (
            StopEvent::Limbo { status: ExitStatus::Code(3) },
            StopReason::Limbo { status: ExitStatus::Code(3) },
        ),
        (
            StopEvent::Exit { status: ExitStatus::Signal(libc::SIGKILL) },
            StopReason::Exited { status: ExitStatus::Signal(libc::SIGKILL) },
        ),
    ];

    for (event, expected) in cases {
        thread.notify(event, &cx)?;
        assert_eq!(thread.stop_reason(), Some(&expected));
    }

    Ok(())
}

#[test]
fn test_stop_reason_descriptions() {
    let signals = UnixSignals::linux();

    let reason = StopReason::Signal { signo: libc::SIGSEGV };
    assert_eq!(reason.description(&signals), "signal SIGSEGV");

    let reason = StopReason::Crash { signo: libc::SIGSEGV, reason: CrashReason::InvalidAddress, fault_addr: 0x10 };
    assert_eq!(reason.description(&signals), "invalid address (fault address: 0x10)");

    assert!(!StopReason::Limbo { status: ExitStatus::Code(0) }.should_stop());
    assert!(StopReason::Trace.should_stop());
}

#[test]
fn test_thread_watchpoint_management() -> Result<()> {
    let mut thread = fake_thread(100, FakeRegisters::x86_64());
    assert_eq!(thread.num_hardware_watchpoints(), 4);
    assert_eq!(thread.find_vacant_watchpoint_index()?, Some(0));

    let mut wp = Watchpoint::new(WatchpointId(1), 0x60_0000, 4);
    assert!(!thread.enable_hardware_watchpoint(&wp)?);

    wp.hardware_index = thread.find_vacant_watchpoint_index()?;
    assert!(thread.enable_hardware_watchpoint(&wp)?);
    assert_eq!(thread.find_vacant_watchpoint_index()?, Some(1));

    assert!(thread.disable_hardware_watchpoint(&wp)?);
    assert_eq!(thread.find_vacant_watchpoint_index()?, Some(0));

    let rip_offset = support::x86_64_layout().info(Reg::Rip.into()).unwrap().offset;
    assert_eq!(thread.register_name_from_offset(rip_offset), Some("rip"));

    Ok(())
}
