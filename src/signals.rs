//! Unix signal table with default debugger policy for each signal.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{Error, Result};

/// Metadata and default handling policy of one signal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignalDescriptor {
    pub signo: i32,
    pub name: String,
    pub short_name: String,

    /// Do not deliver the signal to the inferior by default.
    pub suppress: bool,

    /// Stop the inferior when the signal is received.
    pub stop: bool,

    /// Notify the user when the signal is received.
    pub notify: bool,

    pub description: String,
}

/// Signal table, read-only once built.
#[derive(Clone, Debug, Default)]
pub struct UnixSignals {
    signals: HashMap<i32, SignalDescriptor>,
    names: HashMap<String, i32>,
}

lazy_static! {
    static ref HOST_SIGNALS: UnixSignals = UnixSignals::linux();
}

impl UnixSignals {
    /// POSIX signals, numbered for the host.
    pub fn generic() -> Self {
        let mut signals = Self::default();

        //                 SIGNO            NAME         SUPPRESS STOP   NOTIFY DESCRIPTION
        signals.add(libc::SIGHUP,    "SIGHUP",    false, true,  true,  "hangup");
        signals.add(libc::SIGINT,    "SIGINT",    true,  true,  true,  "interrupt");
        signals.add(libc::SIGQUIT,   "SIGQUIT",   false, true,  true,  "quit");
        signals.add(libc::SIGILL,    "SIGILL",    false, true,  true,  "illegal instruction");
        signals.add(libc::SIGTRAP,   "SIGTRAP",   true,  true,  true,  "trace trap (not reset when caught)");
        signals.add(libc::SIGABRT,   "SIGABRT",   false, true,  true,  "abort()");
        signals.add(libc::SIGFPE,    "SIGFPE",    false, true,  true,  "floating point exception");
        signals.add(libc::SIGKILL,   "SIGKILL",   false, true,  true,  "kill");
        signals.add(libc::SIGBUS,    "SIGBUS",    false, true,  true,  "bus error");
        signals.add(libc::SIGSEGV,   "SIGSEGV",   false, true,  true,  "segmentation violation");
        signals.add(libc::SIGSYS,    "SIGSYS",    false, true,  true,  "bad argument to system call");
        signals.add(libc::SIGPIPE,   "SIGPIPE",   false, true,  true,  "write on a pipe with no one to read it");
        signals.add(libc::SIGALRM,   "SIGALRM",   false, false, false, "alarm clock");
        signals.add(libc::SIGTERM,   "SIGTERM",   false, true,  true,  "software termination signal from kill");
        signals.add(libc::SIGURG,    "SIGURG",    false, false, false, "urgent condition on IO channel");
        signals.add(libc::SIGSTOP,   "SIGSTOP",   true,  true,  true,  "sendable stop signal not from tty");
        signals.add(libc::SIGTSTP,   "SIGTSTP",   false, true,  true,  "stop signal from tty");
        signals.add(libc::SIGCONT,   "SIGCONT",   false, true,  true,  "continue a stopped process");
        signals.add(libc::SIGCHLD,   "SIGCHLD",   false, false, true,  "to parent on child stop or exit");
        signals.add(libc::SIGTTIN,   "SIGTTIN",   false, true,  true,  "to readers process group upon background tty read");
        signals.add(libc::SIGTTOU,   "SIGTTOU",   false, true,  true,  "to readers process group upon background tty write");
        signals.add(libc::SIGIO,     "SIGIO",     false, false, false, "input/output possible signal");
        signals.add(libc::SIGXCPU,   "SIGXCPU",   false, true,  true,  "exceeded CPU time limit");
        signals.add(libc::SIGXFSZ,   "SIGXFSZ",   false, true,  true,  "exceeded file size limit");
        signals.add(libc::SIGVTALRM, "SIGVTALRM", false, false, false, "virtual time alarm");
        signals.add(libc::SIGPROF,   "SIGPROF",   false, false, false, "profiling time alarm");
        signals.add(libc::SIGWINCH,  "SIGWINCH",  false, false, false, "window size changes");
        signals.add(libc::SIGUSR1,   "SIGUSR1",   false, true,  true,  "user defined signal 1");
        signals.add(libc::SIGUSR2,   "SIGUSR2",   false, true,  true,  "user defined signal 2");

        signals
    }

    /// Generic signals, extended with Linux-specific and real-time signals.
    pub fn linux() -> Self {
        let mut signals = Self::generic();

        signals.add(16, "SIGSTKFLT", false, true,  true,  "stack fault");
        signals.add(30, "SIGPWR",    false, true,  true,  "power failure");

        // Reserved by glibc for thread cancellation and `setxid` broadcasts.
        signals.add(32, "SIG32", false, false, false, "threading library internal signal 1");
        signals.add(33, "SIG33", false, false, false, "threading library internal signal 2");

        const RTMIN: i32 = 34;
        const RTMAX: i32 = 64;

        for signo in RTMIN..=RTMAX {
            let name = if signo == RTMIN {
                "SIGRTMIN".to_owned()
            } else if signo == RTMAX {
                "SIGRTMAX".to_owned()
            } else if signo - RTMIN <= (RTMAX - RTMIN) / 2 {
                format!("SIGRTMIN+{}", signo - RTMIN)
            } else {
                format!("SIGRTMAX-{}", RTMAX - signo)
            };

            let description = format!("real time signal {}", signo - RTMIN);

            signals.add(signo, &name, false, false, false, &description);
        }

        signals
    }

    /// Shared table for the host OS.
    pub fn host() -> &'static UnixSignals {
        &HOST_SIGNALS
    }

    fn add(&mut self, signo: i32, name: &str, suppress: bool, stop: bool, notify: bool, description: &str) {
        let short_name = name.strip_prefix("SIG").unwrap_or(name).to_owned();

        let descriptor = SignalDescriptor {
            signo,
            name: name.to_owned(),
            short_name,
            suppress,
            stop,
            notify,
            description: description.to_owned(),
        };

        if let Some(old) = self.signals.insert(signo, descriptor) {
            self.names.remove(&old.name);
            self.names.remove(&old.short_name);
        }

        self.names.insert(name.to_owned(), signo);
        self.names.insert(name.strip_prefix("SIG").unwrap_or(name).to_owned(), signo);
    }

    pub fn get(&self, signo: i32) -> Option<&SignalDescriptor> {
        self.signals.get(&signo)
    }

    /// Look up `signo`, failing if the table has no such signal.
    pub fn signal(&self, signo: i32) -> Result<&SignalDescriptor> {
        self.get(signo).ok_or(Error::UnknownSignal(signo))
    }

    pub fn is_valid(&self, signo: i32) -> bool {
        self.signals.contains_key(&signo)
    }

    pub fn name(&self, signo: i32) -> Option<&str> {
        self.get(signo).map(|s| s.name.as_str())
    }

    /// Resolve a signal name, short name, or decimal number.
    pub fn number_from_name(&self, name: &str) -> Option<i32> {
        if let Some(signo) = self.names.get(name) {
            return Some(*signo);
        }

        name.parse().ok().filter(|signo| self.is_valid(*signo))
    }

    /// Signals in ascending numeric order.
    pub fn iter(&self) -> impl Iterator<Item = &SignalDescriptor> {
        let mut signals: Vec<_> = self.signals.values().collect();
        signals.sort_by_key(|s| s.signo);
        signals.into_iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
