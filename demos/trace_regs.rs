use std::collections::BTreeMap;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::Result;
use dbgshim::breakpoints::{BreakpointSiteList, Watchpoint, WatchpointId, WatchpointList};
use dbgshim::monitor::Monitor;
use dbgshim::{NativeProcess, NativeThread, Pid, ProcessMessage, ResumeState, StopEvent};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
struct Opt {
    #[structopt(short, long)]
    quiet: bool,

    /// Single-step this many instructions after `exec()` before continuing.
    #[structopt(short, long, default_value = "0")]
    steps: usize,

    /// Set a write watchpoint on this address after `exec()`.
    #[structopt(short, long, parse(try_from_str = parse_address))]
    watch: Option<u64>,

    #[structopt(min_values = 1)]
    argv: Vec<String>,
}

fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim_start_matches("0x");
    Ok(u64::from_str_radix(s, 16)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let mut cmd = Command::new(&opt.argv[0]);

    if let Some(args) = opt.argv.get(1..) {
        cmd.args(args);
    }

    // SAFETY: the pre-exec hook only issues a `ptrace(2)` request.
    unsafe {
        cmd.pre_exec(|| {
            nix::sys::ptrace::traceme().map_err(|err| io::Error::from_raw_os_error(err as i32))
        });
    }

    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);

    let mut monitor = Monitor::spawned(pid);
    let mut process = NativeProcess::new(pid);
    let mut threads = BTreeMap::new();

    let breakpoints = BreakpointSiteList::new();
    let mut watchpoints = WatchpointList::new();

    let mut steps = opt.steps;

    while let Some(message) = monitor.wait()? {
        let tid = match message {
            ProcessMessage::Attach { pid } => {
                process.send_message(message)?;

                let mut thread = NativeThread::new(pid, pid);

                if let Some(addr) = opt.watch {
                    let mut wp = Watchpoint::new(WatchpointId(1), addr, 8);
                    wp.hardware_index = thread.find_vacant_watchpoint_index()?;

                    if thread.enable_hardware_watchpoint(&wp)? {
                        println!("watching {:#x}", addr);
                    }

                    watchpoints.add(wp);
                }

                threads.insert(pid, thread);
                pid
            },
            ProcessMessage::NewThread { tid, new } => {
                // The new thread's attach-stop is consumed by the monitor. Its creator is
                // stopped at the clone event until restarted below.
                threads.insert(new, NativeThread::new(pid, new));
                tid
            },
            ProcessMessage::Stop { tid, event } => {
                process.send_message(message)?;

                let cx = process.notify_context(&breakpoints, &watchpoints);

                let thread = match threads.get_mut(&tid) {
                    Some(thread) => thread,
                    None => continue,
                };

                thread.notify(event, &cx)?;

                if let StopEvent::Exit { status } = event {
                    println!("tid = {}: {}", tid, status);
                    threads.remove(&tid);
                    continue;
                }

                if !opt.quiet {
                    let pc = thread.registers_mut().pc()?;
                    let reason = thread
                        .stop_reason()
                        .map(|reason| reason.description(process.signals()))
                        .unwrap_or_else(|| "<none>".into());

                    println!("tid = {}, pc = {:x}: {}", tid, pc, reason);
                }

                // Deliver pending signals the tracee did not get from us.
                let signo = match event {
                    StopEvent::Signal { signo } | StopEvent::Crash { signo, .. } => Some(signo),
                    _ => None,
                };
                thread.set_resume_signal(signo);

                tid
            },
        };

        while process.next_message()?.is_some() {}

        let mut plan = process.will_resume();

        for (other, thread) in threads.iter_mut() {
            let state = if *other != tid {
                ResumeState::Suspended
            } else if steps > 0 {
                steps -= 1;
                ResumeState::Stepping
            } else {
                ResumeState::Running
            };

            thread.set_resume_state(state);
            thread.will_resume(&mut plan, process.signals());
        }

        process.resume(&plan)?;
    }

    Ok(())
}
