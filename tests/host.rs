use anyhow::Result;
use dbgshim::host::{self, OsVersion};
use dbgshim::thread_name;
use ntest::timeout;
use pretty_assertions::assert_eq;

#[test]
fn test_parse_os_version() {
    let v = OsVersion::parse("6.18.44-fc-v130").unwrap();
    assert_eq!(v, OsVersion { major: 6, minor: 18, update: 44 });
    assert_eq!(v.to_string(), "6.18.44");

    let v = OsVersion::parse("5.4").unwrap();
    assert_eq!(v, OsVersion { major: 5, minor: 4, update: 0 });

    assert_eq!(OsVersion::parse("linux"), None);
    assert_eq!(OsVersion::parse("6"), None);
}

#[test]
fn test_host_queries() -> Result<()> {
    assert!(host::os_version()?.is_some());
    assert!(!host::os_build_string()?.is_empty());
    assert!(!host::os_kernel_description()?.is_empty());
    assert_eq!(host::max_thread_name_length(), 16);

    let path = host::program_path().unwrap();
    assert!(path.is_absolute());
    assert_eq!(Some(path), host::program_path());

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_thread_name_round_trip() -> Result<()> {
    let handle = std::thread::spawn(|| -> dbgshim::Result<(String, String)> {
        thread_name::set_this_thread_name("dbgshim-worker")?;
        let name = thread_name::this_thread_name()?;

        let pid = nix::unistd::getpid();
        let tid = nix::unistd::gettid();
        let comm = thread_name::tracee_thread_name(pid, tid)?;

        Ok((name, comm))
    });

    let (name, comm) = handle.join().unwrap()?;
    assert_eq!(name, "dbgshim-worker");
    assert_eq!(comm, "dbgshim-worker");

    Ok(())
}

#[test]
fn test_thread_name_too_long() {
    let handle = std::thread::spawn(|| thread_name::set_this_thread_name("a-name-longer-than-fifteen-bytes"));

    assert!(handle.join().unwrap().is_err());
}
