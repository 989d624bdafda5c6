//! Queries about the host OS and the running debugger executable.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use nix::sys::utsname::{uname, UtsName};
use tracing::warn;

use crate::error::Result;

/// Longest thread name the OS accepts, including the terminating NUL.
pub const MAX_THREAD_NAME_LENGTH: usize = 16;

lazy_static! {
    static ref PROGRAM_PATH: Option<PathBuf> = resolve_program_path();
}

/// Kernel release version.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub update: u32,
}

impl OsVersion {
    /// Parse the leading `major.minor[.update]` of a kernel release string, such as
    /// `6.1.0-13-amd64`.
    pub fn parse(release: &str) -> Option<Self> {
        let numeric = release
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .unwrap_or_default();

        let mut parts = numeric.split('.').filter(|p| !p.is_empty()).map(str::parse::<u32>);

        let major = parts.next()?.ok()?;
        let minor = parts.next()?.ok()?;
        let update = match parts.next() {
            Some(update) => update.ok()?,
            None => 0,
        };

        Some(Self { major, minor, update })
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.update)
    }
}

fn utsname() -> Result<UtsName> {
    Ok(uname()?)
}

fn lossy(s: &OsStr) -> String {
    s.to_string_lossy().into_owned()
}

pub fn os_version() -> Result<Option<OsVersion>> {
    let uts = utsname()?;
    Ok(OsVersion::parse(&lossy(uts.release())))
}

/// Kernel release string, as reported by `uname -r`.
pub fn os_build_string() -> Result<String> {
    Ok(lossy(utsname()?.release()))
}

/// Kernel build description, as reported by `uname -v`.
pub fn os_kernel_description() -> Result<String> {
    Ok(lossy(utsname()?.version()))
}

pub fn max_thread_name_length() -> usize {
    MAX_THREAD_NAME_LENGTH
}

/// Path of the running executable, resolved once.
pub fn program_path() -> Option<&'static Path> {
    PROGRAM_PATH.as_deref()
}

fn resolve_program_path() -> Option<PathBuf> {
    match fs::read_link("/proc/self/exe") {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(%err, "unable to resolve program path");
            None
        },
    }
}
