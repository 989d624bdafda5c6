use anyhow::Result;
use dbgshim::{Error, UnixSignals};
use pretty_assertions::assert_eq;

#[test]
fn test_generic_signals() -> Result<()> {
    let signals = UnixSignals::generic();

    let sigint = signals.signal(libc::SIGINT)?;
    assert_eq!(sigint.name, "SIGINT");
    assert_eq!(sigint.short_name, "INT");
    assert!(sigint.suppress);
    assert!(sigint.stop);
    assert!(sigint.notify);

    let sigalrm = signals.signal(libc::SIGALRM)?;
    assert!(!sigalrm.stop);
    assert!(!sigalrm.notify);

    assert!(!signals.is_valid(16));
    assert!(!signals.is_valid(34));

    Ok(())
}

#[test]
fn test_linux_extensions() -> Result<()> {
    let signals = UnixSignals::linux();

    assert_eq!(signals.name(16), Some("SIGSTKFLT"));
    assert_eq!(signals.name(30), Some("SIGPWR"));
    assert_eq!(signals.name(32), Some("SIG32"));
    assert_eq!(signals.name(33), Some("SIG33"));
    assert_eq!(signals.name(34), Some("SIGRTMIN"));
    assert_eq!(signals.name(35), Some("SIGRTMIN+1"));
    assert_eq!(signals.name(49), Some("SIGRTMIN+15"));
    assert_eq!(signals.name(50), Some("SIGRTMAX-14"));
    assert_eq!(signals.name(63), Some("SIGRTMAX-1"));
    assert_eq!(signals.name(64), Some("SIGRTMAX"));

    assert_eq!(signals.signal(32)?.description, "threading library internal signal 1");

    // Every number from 1 through SIGRTMAX is known.
    assert_eq!(signals.len(), 64);

    let numbers: Vec<i32> = signals.iter().map(|s| s.signo).collect();
    let expected: Vec<i32> = (1..=64).collect();
    assert_eq!(numbers, expected);

    Ok(())
}

#[test]
fn test_unknown_signals() {
    let signals = UnixSignals::host();

    for signo in &[0, -1, 65, 128, i32::MAX] {
        let err = signals.signal(*signo).unwrap_err();

        match err {
            Error::UnknownSignal(n) => assert_eq!(n, *signo),
            err => panic!("unexpected error: {}", err),
        }

        assert!(signals.get(*signo).is_none());
    }
}

#[test]
fn test_number_from_name() {
    let signals = UnixSignals::linux();

    assert_eq!(signals.number_from_name("SIGSEGV"), Some(libc::SIGSEGV));
    assert_eq!(signals.number_from_name("SEGV"), Some(libc::SIGSEGV));
    assert_eq!(signals.number_from_name("SIGRTMAX-1"), Some(63));
    assert_eq!(signals.number_from_name("RTMIN+2"), Some(36));
    assert_eq!(signals.number_from_name("9"), Some(libc::SIGKILL));
    assert_eq!(signals.number_from_name("99"), None);
    assert_eq!(signals.number_from_name("SIGNOPE"), None);
}
