//! Breakpoint site and watchpoint registries, as seen by stop dispatch.
//!
//! Resolving user breakpoints into sites is owned by the debugger core. Threads only
//! need to look up what is registered at a stop address.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::tracer::Pid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BreakpointSiteId(pub u32);

impl fmt::Display for BreakpointSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchpointId(pub u32);

impl fmt::Display for WatchpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Software breakpoint installed at one address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BreakpointSite {
    pub id: BreakpointSiteId,
    pub addr: u64,

    /// Threads the site applies to. `None` means all threads.
    pub threads: Option<BTreeSet<Pid>>,
}

impl BreakpointSite {
    pub fn new(id: BreakpointSiteId, addr: u64) -> Self {
        Self { id, addr, threads: None }
    }

    /// Restrict the site to `tid`, in addition to any threads it already applies to.
    pub fn for_thread(mut self, tid: Pid) -> Self {
        self.threads.get_or_insert_with(BTreeSet::new).insert(tid);
        self
    }

    pub fn valid_for_thread(&self, tid: Pid) -> bool {
        match &self.threads {
            Some(threads) => threads.contains(&tid),
            None => true,
        }
    }
}

pub trait BreakpointSites {
    fn find_by_address(&self, addr: u64) -> Option<&BreakpointSite>;
}

/// Breakpoint sites indexed by address.
#[derive(Clone, Debug, Default)]
pub struct BreakpointSiteList {
    sites: BTreeMap<u64, BreakpointSite>,
}

impl BreakpointSiteList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a site, replacing any site at the same address.
    pub fn add(&mut self, site: BreakpointSite) -> Option<BreakpointSite> {
        self.sites.insert(site.addr, site)
    }

    pub fn remove(&mut self, addr: u64) -> Option<BreakpointSite> {
        self.sites.remove(&addr)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl BreakpointSites for BreakpointSiteList {
    fn find_by_address(&self, addr: u64) -> Option<&BreakpointSite> {
        self.sites.get(&addr)
    }
}

/// Data watchpoint over `size` bytes at `addr`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Watchpoint {
    pub id: WatchpointId,
    pub addr: u64,
    pub size: usize,
    pub read: bool,
    pub write: bool,

    /// Debug register slot, once one has been assigned.
    pub hardware_index: Option<usize>,

    pub enabled: bool,
}

impl Watchpoint {
    pub fn new(id: WatchpointId, addr: u64, size: usize) -> Self {
        Self {
            id,
            addr,
            size,
            read: false,
            write: true,
            hardware_index: None,
            enabled: true,
        }
    }
}

pub trait Watchpoints {
    fn find_by_address(&self, addr: u64) -> Option<&Watchpoint>;
}

#[derive(Clone, Debug, Default)]
pub struct WatchpointList {
    watchpoints: Vec<Watchpoint>,
}

impl WatchpointList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, watchpoint: Watchpoint) {
        self.watchpoints.push(watchpoint);
    }

    pub fn get(&self, id: WatchpointId) -> Option<&Watchpoint> {
        self.watchpoints.iter().find(|wp| wp.id == id)
    }

    pub fn get_mut(&mut self, id: WatchpointId) -> Option<&mut Watchpoint> {
        self.watchpoints.iter_mut().find(|wp| wp.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watchpoint> {
        self.watchpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.watchpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchpoints.is_empty()
    }
}

impl Watchpoints for WatchpointList {
    fn find_by_address(&self, addr: u64) -> Option<&Watchpoint> {
        self.watchpoints.iter().find(|wp| wp.addr == addr)
    }
}
