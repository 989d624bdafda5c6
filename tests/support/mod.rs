#![allow(dead_code)]

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};
use std::sync::Once;

use dbgshim::monitor::Monitor;
use dbgshim::registers::x86_64::Reg;
use dbgshim::registers::{Machine, RegisterAccess, RegisterContext, RegisterLayout};
use dbgshim::tracer::Restart;
use dbgshim::x86::DebugRegister;
use dbgshim::{Error, NativeThread, Pid, Result, Tracer};

#[allow(unused)]
macro_rules! pid {
    ($raw: expr) => {
        dbgshim::Pid::from_raw($raw)
    };
}

// Support absence of `matches!()` in rustc 1.41.0.
#[allow(unused)]
macro_rules! assert_matches {
    ($expr: expr, $pat: pat) => {
        if let $pat = $expr {
            // Pass.
        } else {
            panic!("expected `{}` to match `{}`", stringify!($expr), stringify!($pat));
        }
    };
}

static INIT: Once = Once::new();

/// Install a `RUST_LOG`-filtered subscriber that writes through the test harness.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory register file of one fake thread.
#[derive(Clone, Debug)]
pub struct FakeRegisters {
    pub gpr: Vec<u8>,
    pub fpr: Vec<u8>,
    pub debug: [u64; 8],
    pub gpr_reads: usize,
    pub gpr_writes: usize,

    /// Fail every bulk transfer with `ESRCH`.
    pub dead: bool,
}

impl FakeRegisters {
    pub fn x86_64() -> Self {
        let layout = x86_64_layout();

        Self {
            gpr: vec![0; layout.gpr_size],
            fpr: vec![0; layout.fpr_size],
            debug: [0; 8],
            gpr_reads: 0,
            gpr_writes: 0,
            dead: false,
        }
    }

    /// Store `value` at the offset of the 64-bit register `reg`.
    pub fn poke(&mut self, reg: Reg, value: u64) {
        let info = x86_64_layout().info(reg.into()).unwrap();
        assert_eq!(info.size, 8);
        self.gpr[info.offset..info.offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn peek(&self, reg: Reg) -> u64 {
        let info = x86_64_layout().info(reg.into()).unwrap();
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.gpr[info.offset..info.offset + 8]);
        u64::from_le_bytes(bytes)
    }

    fn check(&self, tid: Pid, expected: usize, actual: usize) -> Result<()> {
        if self.dead {
            return Err(Error::TraceeDied { pid: tid, source: nix::errno::Errno::ESRCH });
        }

        if expected != actual {
            return Err(Error::SizeMismatch { expected, actual });
        }

        Ok(())
    }
}

impl RegisterAccess for FakeRegisters {
    fn read_gpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        self.check(tid, self.gpr.len(), buf.len())?;
        self.gpr_reads += 1;
        buf.copy_from_slice(&self.gpr);
        Ok(())
    }

    fn write_gpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        self.check(tid, self.gpr.len(), buf.len())?;
        self.gpr_writes += 1;
        self.gpr.copy_from_slice(buf);
        Ok(())
    }

    fn read_fpr(&mut self, tid: Pid, buf: &mut [u8]) -> Result<()> {
        self.check(tid, self.fpr.len(), buf.len())?;
        buf.copy_from_slice(&self.fpr);
        Ok(())
    }

    fn write_fpr(&mut self, tid: Pid, buf: &[u8]) -> Result<()> {
        self.check(tid, self.fpr.len(), buf.len())?;
        self.fpr.copy_from_slice(buf);
        Ok(())
    }

    fn read_debug_register(&mut self, _tid: Pid, dr: DebugRegister) -> Result<u64> {
        Ok(self.debug[dr as usize])
    }

    fn write_debug_register(&mut self, _tid: Pid, dr: DebugRegister, value: u64) -> Result<()> {
        self.debug[dr as usize] = value;
        Ok(())
    }
}

pub fn x86_64_layout() -> &'static RegisterLayout {
    RegisterLayout::for_machine(Machine::X86_64)
}

pub fn fake_context(tid: i32, registers: FakeRegisters) -> RegisterContext<FakeRegisters> {
    RegisterContext::new(Pid::from_raw(tid), x86_64_layout(), registers)
}

pub fn fake_thread(tid: i32, registers: FakeRegisters) -> NativeThread<FakeRegisters> {
    NativeThread::with_registers(Pid::from_raw(tid), fake_context(tid, registers))
}

/// Tracer request recorded by [`FakeTracer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Call {
    Resume { tid: Pid, signo: Option<i32> },
    SingleStep { tid: Pid, signo: Option<i32> },
    Detach { pid: Pid },
}

#[derive(Clone, Debug, Default)]
pub struct FakeTracer {
    pub calls: Vec<Call>,
    pub thread_pointer: u64,

    /// Fail restarts of this thread with `ESRCH`.
    pub dead: Option<Pid>,
}

impl FakeTracer {
    fn restart(&mut self, tid: Pid, mode: Restart) -> Result<()> {
        if self.dead == Some(tid) {
            return Err(Error::Restart { pid: tid, mode, source: nix::errno::Errno::ESRCH });
        }

        Ok(())
    }
}

impl Tracer for FakeTracer {
    fn resume(&mut self, tid: Pid, signo: Option<i32>) -> Result<()> {
        self.restart(tid, Restart::Continue)?;
        self.calls.push(Call::Resume { tid, signo });
        Ok(())
    }

    fn single_step(&mut self, tid: Pid, signo: Option<i32>) -> Result<()> {
        self.restart(tid, Restart::Step)?;
        self.calls.push(Call::SingleStep { tid, signo });
        Ok(())
    }

    fn detach(&mut self, pid: Pid) -> Result<()> {
        self.calls.push(Call::Detach { pid });
        Ok(())
    }

    fn read_thread_pointer(&mut self, _tid: Pid) -> Result<u64> {
        Ok(self.thread_pointer)
    }
}

/// Spawn `cmd` as a tracee, which will stop after `execve()`.
pub fn spawn_traced(mut cmd: Command) -> anyhow::Result<(Child, Monitor)> {
    // SAFETY: the pre-exec hook only issues a `ptrace(2)` request.
    unsafe {
        cmd.pre_exec(|| {
            nix::sys::ptrace::traceme().map_err(|err| io::Error::from_raw_os_error(err as i32))
        });
    }

    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);

    Ok((child, Monitor::spawned(pid)))
}
