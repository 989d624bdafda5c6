//! Register context of one stopped thread.

use tracing::{debug, trace};

use super::{RegisterAccess, RegisterId, RegisterInfo, RegisterLayout, RegisterSet, RegisterSetDescriptor, RegisterValue};
use crate::error::{Error, Result};
use crate::tracer::Pid;
use crate::x86::{self, Condition, DebugRegister};

/// Validity of a cached register set snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheState {
    /// Never read.
    Uninitialized,

    /// Mirrors the thread's registers as of its current stop.
    Loaded,

    /// The thread resumed since the snapshot was read.
    Stale,
}

#[derive(Clone, Debug)]
struct Snapshot {
    bytes: Vec<u8>,
    state: CacheState,
}

impl Snapshot {
    fn new(size: usize) -> Self {
        Self { bytes: vec![0; size], state: CacheState::Uninitialized }
    }

    fn invalidate(&mut self) {
        if self.state == CacheState::Loaded {
            self.state = CacheState::Stale;
        }
    }
}

/// Cached, table-driven access to the registers of one traced thread.
///
/// Registers must only be accessed while the thread is stopped. The snapshot of each
/// register set is loaded on first use and stays valid until [`invalidate()`] is called
/// on resume.
///
/// [`invalidate()`]: RegisterContext::invalidate
#[derive(Clone, Debug)]
pub struct RegisterContext<A> {
    tid: Pid,
    layout: &'static RegisterLayout,
    access: A,
    gpr: Snapshot,
    fpr: Snapshot,
}

impl<A: RegisterAccess> RegisterContext<A> {
    pub fn new(tid: Pid, layout: &'static RegisterLayout, access: A) -> Self {
        let gpr = Snapshot::new(layout.gpr_size);
        let fpr = Snapshot::new(layout.fpr_size);

        Self { tid, layout, access, gpr, fpr }
    }

    pub fn tid(&self) -> Pid {
        self.tid
    }

    pub fn layout(&self) -> &'static RegisterLayout {
        self.layout
    }

    pub fn byte_order(&self) -> super::ByteOrder {
        self.layout.byte_order
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    pub fn cache_state(&self, set: RegisterSet) -> CacheState {
        self.snapshot(set).state
    }

    pub fn register_set_count(&self) -> usize {
        self.layout.populated_set_count()
    }

    pub fn register_set(&self, index: usize) -> Option<&'static RegisterSetDescriptor> {
        self.layout.sets.get(index).filter(|set| !set.is_empty())
    }

    pub fn register_info(&self, id: RegisterId) -> Option<&'static RegisterInfo> {
        self.layout.info(id)
    }

    /// Name of the full-width register stored at `offset` in the general-purpose set.
    pub fn register_name_at_offset(&self, offset: usize) -> Option<&'static str> {
        self.layout.info_at_offset(offset).map(|info| info.name)
    }

    fn snapshot(&self, set: RegisterSet) -> &Snapshot {
        match set {
            RegisterSet::GeneralPurpose => &self.gpr,
            RegisterSet::FloatingPoint => &self.fpr,
        }
    }

    fn snapshot_mut(&mut self, set: RegisterSet) -> &mut Snapshot {
        match set {
            RegisterSet::GeneralPurpose => &mut self.gpr,
            RegisterSet::FloatingPoint => &mut self.fpr,
        }
    }

    /// Read `set` from the thread into the cached snapshot.
    pub fn read_register_set(&mut self, set: RegisterSet) -> Result<()> {
        trace!(tid = self.tid.as_raw(), ?set, "reading register set");

        let tid = self.tid;
        let snapshot = match set {
            RegisterSet::GeneralPurpose => &mut self.gpr,
            RegisterSet::FloatingPoint => &mut self.fpr,
        };

        match set {
            RegisterSet::GeneralPurpose => self.access.read_gpr(tid, &mut snapshot.bytes)?,
            RegisterSet::FloatingPoint => self.access.read_fpr(tid, &mut snapshot.bytes)?,
        }

        snapshot.state = CacheState::Loaded;

        Ok(())
    }

    /// Write the cached snapshot of `set` back to the thread.
    pub fn write_register_set(&mut self, set: RegisterSet) -> Result<()> {
        trace!(tid = self.tid.as_raw(), ?set, "writing register set");

        match set {
            RegisterSet::GeneralPurpose => self.access.write_gpr(self.tid, &self.gpr.bytes),
            RegisterSet::FloatingPoint => self.access.write_fpr(self.tid, &self.fpr.bytes),
        }
    }

    fn ensure_loaded(&mut self, set: RegisterSet) -> Result<()> {
        if self.snapshot(set).state == CacheState::Loaded {
            return Ok(());
        }

        self.read_register_set(set)
            .map_err(|source| Error::RegisterSetRead { set, source: Box::new(source) })
    }

    fn resolve(&self, id: RegisterId) -> Result<&'static RegisterInfo> {
        if !id.is_valid() {
            return Err(Error::InternalRegister { name: id.to_string() });
        }

        let layout = self.layout;

        match layout.set_for(id) {
            Some(set) => layout
                .info(id)
                .filter(|info| info.set == set)
                .ok_or(Error::InvalidRegister { id }),
            None => Err(Error::InvalidRegister { id }),
        }
    }

    pub fn read_register(&mut self, id: RegisterId) -> Result<RegisterValue> {
        let info = self.resolve(id)?;
        self.ensure_loaded(info.set)?;

        let bytes = &self.snapshot(info.set).bytes[info.offset..info.offset + info.size];

        Ok(RegisterValue::from_bytes(bytes, self.layout.byte_order))
    }

    /// Write a single register, then flush its whole register set.
    ///
    /// The set is loaded first, so neighboring fields are written back unchanged.
    pub fn write_register(&mut self, id: RegisterId, value: &RegisterValue) -> Result<()> {
        let info = self.resolve(id)?;
        let bytes = value.to_bytes(info.size, self.layout.byte_order)?;

        self.ensure_loaded(info.set)?;

        debug!(tid = self.tid.as_raw(), register = info.name, ?value, "writing register");

        self.snapshot_mut(info.set).bytes[info.offset..info.offset + info.size].copy_from_slice(&bytes);

        let res = self.write_register_set(info.set);

        if res.is_err() {
            // The snapshot holds a value the thread never received.
            self.snapshot_mut(info.set).state = CacheState::Stale;
        }

        res
    }

    pub fn read_register_by_name(&mut self, name: &str) -> Result<RegisterValue> {
        let id = self
            .layout
            .info_by_name(name)
            .map(|info| info.id)
            .ok_or(Error::MissingArgument("register name"))?;

        self.read_register(id)
    }

    /// Expected length of buffers for `read_all_register_values()` and
    /// `write_all_register_values()`.
    pub fn register_file_size(&self) -> usize {
        self.layout.register_file_size()
    }

    /// Serialize the general-purpose register file.
    pub fn read_all_register_values(&mut self) -> Result<Vec<u8>> {
        let size = self.register_file_size();

        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| Error::Allocation { size })?;

        self.read_register_set(RegisterSet::GeneralPurpose)?;

        data.extend_from_slice(&self.gpr.bytes);

        if self.layout.legacy_sentinel {
            // `orig_rax = -1` keeps a restored register file from restarting a syscall.
            data.extend_from_slice(&u64::MAX.to_ne_bytes());
        }

        debug_assert_eq!(data.len(), size);

        Ok(data)
    }

    /// Restore a register file produced by `read_all_register_values()`.
    pub fn write_all_register_values(&mut self, data: &[u8]) -> Result<()> {
        let expected = self.register_file_size();

        if data.len() != expected {
            return Err(Error::SizeMismatch { expected, actual: data.len() });
        }

        let gpr_size = self.layout.gpr_size;
        self.gpr.bytes.copy_from_slice(&data[..gpr_size]);

        match self.write_register_set(RegisterSet::GeneralPurpose) {
            Ok(()) => {
                self.gpr.state = CacheState::Loaded;
                Ok(())
            },
            Err(err) => {
                // The snapshot no longer mirrors the thread.
                self.gpr.state = CacheState::Stale;
                Err(err)
            },
        }
    }

    /// Discard cached snapshots. Called whenever the thread resumes.
    pub fn invalidate(&mut self) {
        self.gpr.invalidate();
        self.fpr.invalidate();
    }

    pub fn pc(&mut self) -> Result<u64> {
        self.read_register(self.layout.pc)?
            .as_u64()
            .ok_or(Error::Unsupported("program counter with unknown byte order"))
    }

    pub fn set_pc(&mut self, pc: u64) -> Result<()> {
        self.write_register(self.layout.pc, &RegisterValue::U64(pc))
    }

    /// Move the PC back onto the software breakpoint that trapped, and return it.
    pub fn update_after_breakpoint(&mut self) -> Result<u64> {
        let pc = self.pc()?;
        let trap_size = self.layout.breakpoint_trap_size;

        if trap_size == 0 {
            return Ok(pc);
        }

        let pc = pc.wrapping_sub(trap_size);
        self.set_pc(pc)?;

        Ok(pc)
    }

    pub fn num_hardware_watchpoints(&self) -> usize {
        self.layout.hw_watchpoint_slots
    }

    fn slot_register(&self, slot: usize) -> Result<DebugRegister> {
        if slot >= self.num_hardware_watchpoints() {
            return Err(Error::MissingArgument("hardware watchpoint slot"));
        }

        DebugRegister::for_slot(slot).ok_or(Error::Unsupported("hardware watchpoint slot"))
    }

    fn debug_register(&mut self, dr: DebugRegister) -> Result<u64> {
        self.access.read_debug_register(self.tid, dr)
    }

    fn set_debug_register(&mut self, dr: DebugRegister, value: u64) -> Result<()> {
        self.access.write_debug_register(self.tid, dr, value)
    }

    pub fn is_watchpoint_hit(&mut self, slot: usize) -> Result<bool> {
        self.slot_register(slot)?;
        let dr6 = self.debug_register(DebugRegister::Dr6)?;

        Ok(x86::dr6_hit(dr6, slot))
    }

    pub fn clear_watchpoint_hits(&mut self) -> Result<()> {
        let dr6 = self.debug_register(DebugRegister::Dr6)?;
        self.set_debug_register(DebugRegister::Dr6, x86::dr6_clear_hits(dr6))
    }

    pub fn watchpoint_address(&mut self, slot: usize) -> Result<u64> {
        let dr = self.slot_register(slot)?;
        self.debug_register(dr)
    }

    pub fn is_watchpoint_vacant(&mut self, slot: usize) -> Result<bool> {
        self.slot_register(slot)?;
        let dr7 = self.debug_register(DebugRegister::Dr7)?;

        Ok(x86::dr7_vacant(dr7, slot))
    }

    /// Arm `slot` to trap on accesses to `size` bytes at `addr`.
    ///
    /// Returns `false` if the request cannot be encoded: `size` must be 1, 2, 4, or 8,
    /// `addr` must be aligned to it, and at least one of `read` or `write` must be set.
    /// Read-only watchpoints are widened to read/write.
    pub fn set_hardware_watchpoint(&mut self, addr: u64, size: usize, read: bool, write: bool, slot: usize) -> Result<bool> {
        let dr = self.slot_register(slot)?;

        if !(read || write) || size == 0 || addr % size as u64 != 0 {
            return Ok(false);
        }

        let condition = if read { Condition::ReadWrite } else { Condition::Write };

        let dr7 = self.debug_register(DebugRegister::Dr7)?;
        let dr7 = match x86::dr7_enable(dr7, slot, condition, size) {
            Some(dr7) => dr7,
            None => return Ok(false),
        };

        debug!(tid = self.tid.as_raw(), slot, addr, size, ?condition, "arming hardware watchpoint");

        self.set_debug_register(dr, addr)?;
        self.set_debug_register(DebugRegister::Dr7, dr7)?;

        Ok(true)
    }

    pub fn clear_hardware_watchpoint(&mut self, slot: usize) -> Result<bool> {
        let dr = match self.slot_register(slot) {
            Ok(dr) => dr,
            Err(_) => return Ok(false),
        };

        let dr7 = self.debug_register(DebugRegister::Dr7)?;
        self.set_debug_register(DebugRegister::Dr7, x86::dr7_disable(dr7, slot))?;
        self.set_debug_register(dr, 0)?;

        let dr6 = self.debug_register(DebugRegister::Dr6)?;
        self.set_debug_register(DebugRegister::Dr6, dr6 & !(1 << slot))?;

        Ok(true)
    }
}
